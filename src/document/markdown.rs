//! Markdown loading: rendered to HTML with `pulldown-cmark`, then parsed.
use pulldown_cmark::{Options, Parser, html};

use super::Document;

/// Render Markdown the way chat front-ends do: fenced blocks become
/// `<pre><code class="language-…">`.
pub fn render_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(source, options);
    let mut rendered = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut rendered, parser);
    rendered
}

impl Document {
    pub fn parse_markdown(source: &str) -> Self {
        Document::parse_html(&render_html(source))
    }
}
