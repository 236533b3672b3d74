//! Block classification and filename inference.
//!
//! - [`language`]: content tag from markup class hints
//! - [`shell`]: executable shell script check
//! - [`context`]: reading a block's surroundings out of the document
//! - [`filename`]: the ordered inference cascade
//! - [`rules`]: the code-structure rule table used by the cascade
pub mod context;
pub mod filename;
pub mod language;
pub mod rules;
pub mod shell;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use context::BlockContext;
pub use filename::{FilenameInference, is_valid_filename, to_snake_case};

/// Coarse content classification, doubling as the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContentTag {
    #[serde(rename = "rs")]
    Rust,
    #[serde(rename = "js")]
    JavaScript,
    #[serde(rename = "ts")]
    TypeScript,
    #[serde(rename = "py")]
    Python,
    #[serde(rename = "sh")]
    Shell,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "yaml")]
    Yaml,
    #[serde(rename = "toml")]
    Toml,
    #[serde(rename = "sql")]
    Sql,
    #[serde(rename = "html")]
    Html,
    #[serde(rename = "css")]
    Css,
    #[serde(rename = "md")]
    Markdown,
    #[serde(rename = "go")]
    Go,
    #[serde(rename = "java")]
    Java,
    #[serde(rename = "cpp")]
    Cpp,
    #[serde(rename = "rb")]
    Ruby,
    #[serde(rename = "php")]
    Php,
    #[serde(rename = "swift")]
    Swift,
    #[serde(rename = "kt")]
    Kotlin,
    #[serde(rename = "dockerfile")]
    Dockerfile,
    #[default]
    #[serde(rename = "txt")]
    Text,
}

impl ContentTag {
    pub const ALL: [ContentTag; 21] = [
        ContentTag::Rust,
        ContentTag::JavaScript,
        ContentTag::TypeScript,
        ContentTag::Python,
        ContentTag::Shell,
        ContentTag::Json,
        ContentTag::Yaml,
        ContentTag::Toml,
        ContentTag::Sql,
        ContentTag::Html,
        ContentTag::Css,
        ContentTag::Markdown,
        ContentTag::Go,
        ContentTag::Java,
        ContentTag::Cpp,
        ContentTag::Ruby,
        ContentTag::Php,
        ContentTag::Swift,
        ContentTag::Kotlin,
        ContentTag::Dockerfile,
        ContentTag::Text,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ContentTag::Rust => "rs",
            ContentTag::JavaScript => "js",
            ContentTag::TypeScript => "ts",
            ContentTag::Python => "py",
            ContentTag::Shell => "sh",
            ContentTag::Json => "json",
            ContentTag::Yaml => "yaml",
            ContentTag::Toml => "toml",
            ContentTag::Sql => "sql",
            ContentTag::Html => "html",
            ContentTag::Css => "css",
            ContentTag::Markdown => "md",
            ContentTag::Go => "go",
            ContentTag::Java => "java",
            ContentTag::Cpp => "cpp",
            ContentTag::Ruby => "rb",
            ContentTag::Php => "php",
            ContentTag::Swift => "swift",
            ContentTag::Kotlin => "kt",
            ContentTag::Dockerfile => "dockerfile",
            ContentTag::Text => "txt",
        }
    }
}

impl fmt::Display for ContentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContentTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        ContentTag::ALL
            .into_iter()
            .find(|tag| tag.extension() == s)
            .ok_or_else(|| format!("unknown content tag: {s}"))
    }
}

/// Which cascade stage produced a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    Header,
    DataAttr,
    TitleAttr,
    Context,
    Comment,
    CodeStructure,
    Markdown,
    Extracted,
    Generated,
}

impl DetectionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionSource::Header => "header",
            DetectionSource::DataAttr => "data-attr",
            DetectionSource::TitleAttr => "title-attr",
            DetectionSource::Context => "context",
            DetectionSource::Comment => "comment",
            DetectionSource::CodeStructure => "code-structure",
            DetectionSource::Markdown => "markdown",
            DetectionSource::Extracted => "extracted",
            DetectionSource::Generated => "generated",
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    /// Only ever paired with [`DetectionSource::Generated`].
    None,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::None => "none",
        })
    }
}

/// A best-effort destination filename for a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub filename: String,
    pub source: DetectionSource,
    pub confidence: Confidence,
}

impl DetectionResult {
    /// Accept `filename` only if it passes [`is_valid_filename`].
    pub(crate) fn checked(
        filename: &str,
        source: DetectionSource,
        confidence: Confidence,
    ) -> Option<Self> {
        is_valid_filename(filename).then(|| Self {
            filename: filename.to_string(),
            source,
            confidence,
        })
    }

    pub(crate) fn generated(filename: String) -> Self {
        Self {
            filename,
            source: DetectionSource::Generated,
            confidence: Confidence::None,
        }
    }
}
