//! The filename inference cascade.
//!
//! Stages run in a fixed order and the first one yielding a valid candidate
//! wins:
//!
//! 1. header / `data-file` / `title` metadata
//! 2. conversational phrases in the preceding text
//! 3. a filename comment in the first lines of the block
//! 4. the code-structure rule table ([`super::rules`])
//! 5. markdown-style labels right above the block
//! 6. the first top-level declaration
//! 7. a synthesized `snippet-<base36 millis>.<ext>` name
//!
//! Every candidate goes through [`is_valid_filename`]; a rejected candidate
//! means the stage found nothing.
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::context::BlockContext;
use super::rules::match_structure;
use super::{Confidence, ContentTag, DetectionResult, DetectionSource};

/// Filename with an extension, as it appears in prose.
const NAME: &str = r"[a-zA-Z0-9_\-./\\]+\.[a-zA-Z0-9]+";
/// Optional opening/closing quote.
const Q: &str = r"[`'\x22]?";

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9_\-./\\]+\.([a-zA-Z0-9]+))$").expect("static header pattern")
});

static TITLE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.[a-z0-9]+$").expect("static title pattern"));

struct PhrasePattern {
    pattern: Regex,
    confidence: Confidence,
}

fn phrase(template: &str, confidence: Confidence) -> PhrasePattern {
    let pattern = template.replace("{NAME}", NAME).replace("{Q}", Q);
    PhrasePattern {
        pattern: Regex::new(&pattern).expect("static phrase pattern"),
        confidence,
    }
}

/// Ordered phrases that name a file in conversation.
static CONVERSATION: LazyLock<Vec<PhrasePattern>> = LazyLock::new(|| {
    vec![
        phrase(r"(?i)(?:save|create|write)\s+(?:this\s+)?(?:as|to|in)\s+{Q}({NAME}){Q}", Confidence::High),
        phrase(r"(?i)(?:file|filename|name)[:\s]+{Q}({NAME}){Q}", Confidence::High),
        phrase(r"(?i)(?:called|named)\s+{Q}({NAME}){Q}", Confidence::High),
        phrase(r"(?i)(?:update|modify|edit|change)\s+(?:your\s+)?{Q}({NAME}){Q}", Confidence::High),
        phrase(r"(?i)(?:here'?s?|this is)\s+(?:the\s+)?(?:updated?\s+)?{Q}({NAME}){Q}", Confidence::Medium),
        phrase(r"(?i)[`'\x22]([a-zA-Z0-9_\-]+/{NAME})[`'\x22]", Confidence::Medium),
        phrase(r"(?i)[`'\x22]({NAME})[`'\x22]", Confidence::Low),
        phrase(r"(?i)\bin\s+{Q}({NAME}){Q}", Confidence::Medium),
        phrase(r"(?m)^#+\s*{Q}({NAME}){Q}\s*$", Confidence::High),
    ]
});

/// Comment leaders recognised on the first lines of a block.
static LEADING_COMMENT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    const LABEL: &str = r"(?:file(?:name|path)?[:\s]+)?";
    [r"^//\s*", r"^#\s*", r"^/\*+\s*(?:@file\s+)?", r"^<!--\s*", r"^--\s*"]
        .into_iter()
        .map(|leader| {
            Regex::new(&format!("(?i){leader}{LABEL}({NAME})")).expect("static comment pattern")
        })
        .collect()
});

/// A heading, a bold span or a `File:` label that is entirely a filename.
static MARKDOWN_LABEL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"^#+\s*{Q}({NAME}){Q}\s*$"),
        format!(r"^\*\*{Q}({NAME}){Q}\*\*$"),
        format!(r"(?i)^File:\s*{Q}({NAME}){Q}$"),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static label pattern"))
    .collect()
});

/// First top-level declaration; `None` keeps the block's own extension.
static DECLARATIONS: LazyLock<Vec<(Regex, Option<&'static str>)>> = LazyLock::new(|| {
    [
        (r"(?m)^(?:export\s+)?(?:async\s+)?function\s+([A-Za-z0-9_]+)", None),
        (r"(?m)^(?:export\s+)?class\s+([A-Za-z0-9_]+)", None),
        (r"(?m)^(?:export\s+)?const\s+([A-Za-z0-9_]+)\s*=", None),
        (r"(?m)^(?:pub\s+)?(?:struct|enum)\s+([A-Za-z0-9_]+)", Some("rs")),
    ]
    .into_iter()
    .map(|(p, ext)| (Regex::new(p).expect("static declaration pattern"), ext))
    .collect()
});

static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.[a-z0-9]{1,10}$").expect("static extension pattern"));

/// Whether `name` is plausible as a destination filename.
///
/// Dotfiles need at least three segments (`.env.local` but not `.env`),
/// names may not start with a digit, must end in a short alphanumeric
/// extension and must not contain `<>:"?*` or control characters.
pub fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    if name.starts_with('.') && name.split('.').count() < 3 {
        return false;
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    if !EXTENSION.is_match(name) {
        return false;
    }
    !name
        .chars()
        .any(|c| matches!(c, '<' | '>' | ':' | '"' | '?' | '*') || c.is_control())
}

/// `HttpServer` -> `http_server`.
pub fn to_snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    for c in ident.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
        }
        out.push(c.to_ascii_lowercase());
    }
    let trimmed = out.strip_prefix('_').unwrap_or(&out);

    let mut folded = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        if c == '_' && folded.ends_with('_') {
            continue;
        }
        folded.push(c);
    }
    folded
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// Stage 1: the element right above the block, then metadata attributes.
pub fn from_header(ctx: &BlockContext) -> Option<DetectionResult> {
    if let Some(header) = &ctx.header {
        if let Some(caps) = HEADER.captures(header) {
            if let Some(result) =
                DetectionResult::checked(&caps[1], DetectionSource::Header, Confidence::High)
            {
                return Some(result);
            }
        }
    }

    if let Some(result) = ctx.data_file.as_deref().and_then(|name| {
        DetectionResult::checked(name, DetectionSource::DataAttr, Confidence::High)
    }) {
        return Some(result);
    }

    ctx.title
        .as_deref()
        .filter(|title| TITLE_EXTENSION.is_match(title))
        .and_then(|title| {
            DetectionResult::checked(title, DetectionSource::TitleAttr, Confidence::High)
        })
}

/// Stage 2: phrases like "save this as `x.rs`" in the preceding text.
pub fn from_conversation(text: &str) -> Option<DetectionResult> {
    CONVERSATION.iter().find_map(|p| {
        let caps = p.pattern.captures(text)?;
        DetectionResult::checked(&caps[1], DetectionSource::Context, p.confidence)
    })
}

/// Stage 3: `// src/main.rs`, `# file: app.py`, `<!-- index.html -->` ...
pub fn from_leading_comment(code: &str) -> Option<DetectionResult> {
    code.trim().lines().take(3).find_map(|line| {
        LEADING_COMMENT.iter().find_map(|re| {
            let caps = re.captures(line)?;
            DetectionResult::checked(&caps[1], DetectionSource::Comment, Confidence::High)
        })
    })
}

/// Stage 5: labels are the trimmed texts of nearby preceding elements.
pub fn from_markdown_labels(labels: &[String]) -> Option<DetectionResult> {
    labels.iter().find_map(|label| {
        MARKDOWN_LABEL.iter().find_map(|re| {
            let caps = re.captures(label)?;
            DetectionResult::checked(&caps[1], DetectionSource::Markdown, Confidence::High)
        })
    })
}

/// Stage 6: name the file after its first top-level declaration.
pub fn extract_declaration(code: &str, tag: ContentTag) -> Option<DetectionResult> {
    DECLARATIONS.iter().find_map(|(re, ext)| {
        let caps = re.captures(code)?;
        let name = format!(
            "{}.{}",
            to_snake_case(&caps[1]),
            ext.unwrap_or(tag.extension())
        );
        DetectionResult::checked(&name, DetectionSource::Extracted, Confidence::Low)
    })
}

/// Stage 7: always succeeds.
pub fn synthesize(tag: ContentTag, millis: i64) -> DetectionResult {
    let stamp = base36(u64::try_from(millis).unwrap_or_default());
    DetectionResult::generated(format!("snippet-{stamp}.{}", tag.extension()))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Runs the cascade. The clock only feeds the final synthesized name, so a
/// fixed clock makes inference fully deterministic.
#[derive(Debug, Clone, Copy)]
pub struct FilenameInference {
    clock: fn() -> i64,
}

impl Default for FilenameInference {
    fn default() -> Self {
        Self { clock: now_millis }
    }
}

impl FilenameInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: fn() -> i64) -> Self {
        Self { clock }
    }

    pub fn infer(&self, code: &str, ctx: &BlockContext, tag: ContentTag) -> DetectionResult {
        let result = from_header(ctx)
            .or_else(|| from_conversation(&ctx.surrounding_text))
            .or_else(|| from_leading_comment(code))
            .or_else(|| match_structure(code, tag))
            .or_else(|| from_markdown_labels(&ctx.labels))
            .or_else(|| extract_declaration(code, tag))
            .unwrap_or_else(|| synthesize(tag, (self.clock)()));
        debug!(
            "Inferred {} ({}, {})",
            result.filename, result.source, result.confidence
        );
        result
    }
}
