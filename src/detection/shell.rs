use std::sync::LazyLock;

use regex::Regex;

use super::ContentTag;

static SHEBANG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#!/(?:bin|usr/bin)/(?:bash|sh|zsh)").expect("static pattern"));

/// Whether a block is a shell script to execute rather than a file to save:
/// either tagged `sh`, or starting with a bash/sh/zsh interpreter directive.
pub fn is_executable(text: &str, tag: ContentTag) -> bool {
    tag == ContentTag::Shell || SHEBANG.is_match(text.trim())
}
