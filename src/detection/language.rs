use std::sync::LazyLock;

use regex::Regex;

use super::ContentTag;
use crate::document::{Document, NodeId};

/// One entry of the alias table: a tag and the class-hint words that select it.
struct TagAliases {
    tag: ContentTag,
    aliases: &'static [&'static str],
}

/// Ordered; the first entry with a whole-word hit wins.
const ALIASES: &[TagAliases] = &[
    TagAliases { tag: ContentTag::Rust, aliases: &["rust"] },
    TagAliases { tag: ContentTag::JavaScript, aliases: &["javascript", "js"] },
    TagAliases { tag: ContentTag::TypeScript, aliases: &["typescript", "ts"] },
    TagAliases { tag: ContentTag::Python, aliases: &["python", "py"] },
    TagAliases { tag: ContentTag::Shell, aliases: &["bash", "shell", "sh"] },
    TagAliases { tag: ContentTag::Json, aliases: &["json"] },
    TagAliases { tag: ContentTag::Yaml, aliases: &["yaml", "yml"] },
    TagAliases { tag: ContentTag::Toml, aliases: &["toml"] },
    TagAliases { tag: ContentTag::Sql, aliases: &["sql"] },
    TagAliases { tag: ContentTag::Html, aliases: &["html"] },
    TagAliases { tag: ContentTag::Css, aliases: &["css"] },
    TagAliases { tag: ContentTag::Markdown, aliases: &["markdown", "md"] },
    TagAliases { tag: ContentTag::Go, aliases: &["go", "golang"] },
    TagAliases { tag: ContentTag::Java, aliases: &["java"] },
    TagAliases { tag: ContentTag::Cpp, aliases: &["c", "cpp", r"c\+\+"] },
    TagAliases { tag: ContentTag::Ruby, aliases: &["ruby", "rb"] },
    TagAliases { tag: ContentTag::Php, aliases: &["php"] },
    TagAliases { tag: ContentTag::Swift, aliases: &["swift"] },
    TagAliases { tag: ContentTag::Kotlin, aliases: &["kotlin", "kt"] },
    TagAliases { tag: ContentTag::Dockerfile, aliases: &["dockerfile"] },
];

static TABLE: LazyLock<Vec<(ContentTag, Regex)>> = LazyLock::new(|| {
    ALIASES
        .iter()
        .map(|entry| {
            let pattern = format!(r"(?i)\b({})\b", entry.aliases.join("|"));
            (entry.tag, Regex::new(&pattern).expect("static alias pattern"))
        })
        .collect()
});

/// Map class hints (e.g. `"language-rust hljs"`) to a content tag.
pub fn classify(hints: &str) -> ContentTag {
    TABLE
        .iter()
        .find(|(_, re)| re.is_match(hints))
        .map(|(tag, _)| *tag)
        .unwrap_or_default()
}

/// Class hints of a block: its inner `<code>` element's classes followed by
/// the block's own.
pub fn block_hints(doc: &Document, block: NodeId) -> String {
    let code = doc.first_descendant_by_tag(block, "code").unwrap_or(block);
    format!("{} {}", doc.class_name(code), doc.class_name(block))
}

pub fn classify_block(doc: &Document, block: NodeId) -> ContentTag {
    classify(&block_hints(doc, block))
}
