//! HTML loading via `scraper`.
use scraper::{ElementRef, Html, Node};

use super::{Document, Element, NodeData, NodeId};

impl Document {
    /// Parse an HTML document or fragment. Only the `<body>` subtree is kept;
    /// comments, doctypes and processing instructions are dropped.
    pub fn parse_html(source: &str) -> Self {
        let html = Html::parse_document(source);
        let mut doc = Document::new();

        let source_body = html
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "body");

        if let Some(source_body) = source_body {
            let body = doc.body();
            if let NodeData::Element(element) = &mut doc.nodes[body.0].data {
                for (k, v) in source_body.value().attrs() {
                    element.set_attr(k, v);
                }
            }
            doc.import_children(source_body, body);
        }
        doc
    }

    fn import_children(&mut self, source: ElementRef<'_>, parent: NodeId) {
        for child in source.children() {
            match child.value() {
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let mut element = Element::new(child_el.value().name());
                    for (k, v) in child_el.value().attrs() {
                        element.set_attr(k, v);
                    }
                    let id = self.alloc(NodeData::Element(element));
                    self.link(parent, id);
                    self.import_children(child_el, id);
                }
                Node::Text(text) => {
                    let id = self.alloc(NodeData::Text(String::from(&**text)));
                    self.link(parent, id);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment_into_body() {
        let doc = Document::parse_html(
            r#"<p>Save this as <code>notes/todo.md</code></p>
<pre class="language-md" data-file="todo.md"><code>- buy milk</code></pre>"#,
        );
        let pres = doc.elements_by_tag("pre");
        assert_eq!(pres.len(), 1);
        let pre = pres[0];
        assert_eq!(doc.attr(pre, "data-file"), Some("todo.md"));
        assert_eq!(doc.text_content(pre), "- buy milk");

        let p = doc.previous_element_sibling(pre).unwrap();
        assert_eq!(doc.tag_name(p), Some("p"));
        assert_eq!(doc.text_content(p), "Save this as notes/todo.md");
    }

    #[test]
    fn test_parse_full_document_skips_head() {
        let doc = Document::parse_html(
            "<!DOCTYPE html><html><head><title>main.rs</title></head>\
             <body class=\"chat\"><!-- note --><div><pre>x</pre></div></body></html>",
        );
        assert!(doc.has_class(doc.body(), "chat"));
        assert_eq!(doc.elements_by_tag("title").len(), 0);
        assert_eq!(doc.text_content(doc.body()), "x");
    }
}
