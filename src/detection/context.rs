//! What the cascade is allowed to see of a block's surroundings.
//!
//! Everything is read out of the document once, up front, so inference
//! itself is a pure function of the block text, this context and the tag.
use crate::config::ContextConfig;
use crate::document::{Document, NodeId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockContext {
    /// Trimmed text of the element right before the block, or before its
    /// parent when the block is the first child.
    pub header: Option<String>,
    /// `data-file` / `data-filename` metadata.
    pub data_file: Option<String>,
    /// Tooltip-style `title` of the block or its code element.
    pub title: Option<String>,
    /// Preceding conversation text, bounded.
    pub surrounding_text: String,
    /// Trimmed text of nearby preceding elements, nearest first.
    pub labels: Vec<String>,
}

impl BlockContext {
    /// Context consisting only of preceding conversation text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            surrounding_text: text.into(),
            ..Self::default()
        }
    }

    pub fn collect(doc: &Document, block: NodeId, limits: &ContextConfig) -> Self {
        let code = doc.first_descendant_by_tag(block, "code");
        Self {
            header: header_text(doc, block),
            data_file: code.and_then(|code| {
                non_empty(doc.attr(code, "data-file"))
                    .or_else(|| non_empty(doc.attr(code, "data-filename")))
                    .or_else(|| non_empty(doc.attr(block, "data-file")))
            }),
            title: non_empty(doc.attr(block, "title"))
                .or_else(|| code.and_then(|code| non_empty(doc.attr(code, "title")))),
            surrounding_text: surrounding_text(doc, block, limits),
            labels: labels(doc, block, limits.label_siblings),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Raw text of a block: its `<code>` element if it has one, else the block.
pub fn block_text(doc: &Document, block: NodeId) -> String {
    let code = doc.first_descendant_by_tag(block, "code").unwrap_or(block);
    doc.text_content(code)
}

fn header_text(doc: &Document, block: NodeId) -> Option<String> {
    let header = doc
        .previous_element_sibling(block)
        .or_else(|| doc.parent(block).and_then(|p| doc.previous_element_sibling(p)))?;
    Some(doc.text_content(header).trim().to_string())
}

fn surrounding_text(doc: &Document, block: NodeId, limits: &ContextConfig) -> String {
    let mut texts: Vec<String> = doc
        .preceding_element_siblings(block)
        .take(limits.preceding_siblings)
        .map(|s| doc.text_content(s))
        .collect();

    let parent = doc.parent(block);
    if let Some(parent) = parent {
        texts.extend(
            doc.preceding_element_siblings(parent)
                .take(limits.parent_siblings)
                .map(|s| doc.text_content(s)),
        );
    }

    if let Some(grandparent) = parent.and_then(|p| doc.parent(p)) {
        texts.extend(
            doc.preceding_element_siblings(grandparent)
                .take(limits.grandparent_siblings)
                .map(|s| doc.text_content(s)),
        );
    }

    texts.join(" ").chars().take(limits.max_chars).collect()
}

fn labels(doc: &Document, block: NodeId, per_level: usize) -> Vec<String> {
    let mut nodes: Vec<NodeId> = doc
        .preceding_element_siblings(block)
        .take(per_level)
        .collect();
    if let Some(parent) = doc.parent(block) {
        nodes.extend(doc.preceding_element_siblings(parent).take(per_level));
    }
    nodes
        .into_iter()
        .map(|n| doc.text_content(n).trim().to_string())
        .collect()
}
