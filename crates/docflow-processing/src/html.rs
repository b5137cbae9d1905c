//! HTML text extraction helpers
//!
//! Shared by the clean stage (full strip) and by adapters that need plain
//! text out of fetched HTML. Scripts, styles, and the document head never
//! contribute text.

use ego_tree::NodeRef;
use scraper::{Html, Node};

/// Elements whose subtree contributes no visible text
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "head", "template"];

/// Block-level elements that imply a break between text runs
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "li", "br", "tr", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "pre", "table",
];

/// Quick structural sniff for HTML content
pub fn looks_like_html(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with('<')
        && ["<!doctype", "<html", "<head", "<body", "<div", "<p", "<article", "<main"]
            .iter()
            .any(|tag| trimmed.to_ascii_lowercase().contains(tag))
}

/// Strip an HTML document to its visible text
///
/// Text runs are separated by single newlines at block boundaries; inline
/// markup concatenates without extra separators. Whitespace is not
/// otherwise normalized here - that is the clean stage's job.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    collect_text(&document.tree.root(), &[], &mut out);
    out
}

/// Collect visible text from one element subtree
pub fn element_text(element: &scraper::ElementRef<'_>, out: &mut String) {
    collect_text(&**element, &[], out);
}

/// Collect visible text from a subtree, additionally skipping the named
/// elements (e.g. `nav`, `header`, `footer`, `aside` for page chrome)
pub fn element_text_excluding(element: &scraper::ElementRef<'_>, excluded: &[&str], out: &mut String) {
    collect_text(&**element, excluded, out);
}

fn collect_text(node: &NodeRef<'_, Node>, excluded: &[&str], out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.text),
            Node::Element(element) => {
                let name = element.name();
                if SKIPPED_ELEMENTS.contains(&name) || excluded.contains(&name) {
                    continue;
                }
                collect_text(&child, excluded, out);
                if BLOCK_ELEMENTS.contains(&name) && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_scripts() {
        let html = r#"<html><head><title>T</title><style>p{color:red}</style></head>
            <body><p>Hello <b>world</b>.</p><script>alert("x")</script><p>Bye.</p></body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Hello world."));
        assert!(text.contains("Bye."));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color:red"));
    }

    #[test]
    fn block_boundaries_separate_runs() {
        let text = html_to_text("<div>first</div><div>second</div>");
        assert!(text.contains("first\n"));
        assert!(text.contains("second"));
    }

    #[test]
    fn excluded_elements_contribute_no_text() {
        let html = "<body><nav>menu</nav><p>real content</p><footer>legal</footer></body>";
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut out = String::new();
        element_text_excluding(&root, &["nav", "footer"], &mut out);
        assert!(out.contains("real content"));
        assert!(!out.contains("menu"));
        assert!(!out.contains("legal"));
    }

    #[test]
    fn sniffs_html_content() {
        assert!(looks_like_html("<!DOCTYPE html><html><body>x</body></html>"));
        assert!(looks_like_html("  <div class=\"a\">x</div>"));
        assert!(!looks_like_html("just a plain sentence < with a comparison"));
        assert!(!looks_like_html("{\"json\": true}"));
    }
}
