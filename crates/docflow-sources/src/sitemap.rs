//! Sitemaps-protocol parsing
//!
//! Handles both `<urlset>` leaves and `<sitemapindex>` indexes. Schema
//! drift (missing `<lastmod>`, extra elements, namespace prefixes) is
//! tolerated silently; only `<loc>` entries matter here.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{SourceError, SourceResult};

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// Leaf sitemap: page URLs
    UrlSet(Vec<String>),
    /// Sitemap index: child sitemap URLs to resolve recursively
    Index(Vec<String>),
}

impl SitemapDocument {
    /// The collected `<loc>` values, whichever kind this is
    pub fn locations(&self) -> &[String] {
        match self {
            Self::UrlSet(urls) | Self::Index(urls) => urls,
        }
    }
}

/// Strip a namespace prefix from an element name
fn local_name(name: &[u8]) -> Vec<u8> {
    name.rsplit(|&b| b == b':')
        .next()
        .unwrap_or(name)
        .to_ascii_lowercase()
}

/// Parse a sitemap or sitemap-index body
///
/// # Errors
///
/// Returns a validation error when the document is not XML or has neither
/// a `<urlset>` nor a `<sitemapindex>` root.
pub fn parse_sitemap(xml: &str) -> SourceResult<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut is_index: Option<bool> = None;
    let mut in_entry = false;
    let mut in_loc = false;
    let mut locations: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = local_name(element.name().as_ref());
                match name.as_slice() {
                    b"urlset" => is_index = is_index.or(Some(false)),
                    b"sitemapindex" => is_index = is_index.or(Some(true)),
                    b"url" | b"sitemap" => in_entry = true,
                    b"loc" => in_loc = in_entry,
                    _ => {}
                }
            }
            Ok(Event::End(element)) => {
                let name = local_name(element.name().as_ref());
                match name.as_slice() {
                    b"url" | b"sitemap" => in_entry = false,
                    b"loc" => in_loc = false,
                    _ => {}
                }
            }
            Ok(Event::Text(text)) => {
                if in_loc {
                    let value = text
                        .unescape()
                        .map_err(|e| SourceError::Validation(format!("bad sitemap text: {e}")))?;
                    let value = value.trim().to_string();
                    if !value.is_empty() {
                        locations.push(value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SourceError::Validation(format!("sitemap XML error: {e}")));
            }
        }
    }

    match is_index {
        Some(true) => Ok(SitemapDocument::Index(locations)),
        Some(false) => Ok(SitemapDocument::UrlSet(locations)),
        None => Err(SourceError::Validation(
            "document is neither a urlset nor a sitemapindex".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.test/a</loc><lastmod>2024-01-01</lastmod></url>
  <url><loc>https://example.test/b</loc></url>
  <url><loc> https://example.test/c </loc><priority>0.5</priority></url>
</urlset>"#;
        let parsed = parse_sitemap(xml).unwrap();
        assert_eq!(
            parsed,
            SitemapDocument::UrlSet(vec![
                "https://example.test/a".to_string(),
                "https://example.test/b".to_string(),
                "https://example.test/c".to_string(),
            ])
        );
    }

    #[test]
    fn parses_a_sitemap_index() {
        let xml = r#"<?xml version="1.0"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.test/sitemap-1.xml</loc></sitemap>
  <sitemap><loc>https://example.test/sitemap-2.xml</loc></sitemap>
</sitemapindex>"#;
        let parsed = parse_sitemap(xml).unwrap();
        assert!(matches!(parsed, SitemapDocument::Index(ref urls) if urls.len() == 2));
    }

    #[test]
    fn tolerates_namespace_prefixes_and_extra_elements() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sm:url><sm:loc>https://example.test/x</sm:loc><sm:changefreq>daily</sm:changefreq></sm:url>
  <unknown>ignored</unknown>
</sm:urlset>"#;
        let parsed = parse_sitemap(xml).unwrap();
        assert_eq!(
            parsed.locations(),
            &["https://example.test/x".to_string()]
        );
    }

    #[test]
    fn rejects_non_sitemap_documents() {
        assert!(parse_sitemap("<html><body>nope</body></html>").is_err());
        assert!(parse_sitemap("not xml at all").is_err());
    }

    #[test]
    fn loc_outside_an_entry_is_ignored() {
        let xml = r"<urlset><loc>https://example.test/stray</loc>
            <url><loc>https://example.test/real</loc></url></urlset>";
        let parsed = parse_sitemap(xml).unwrap();
        assert_eq!(parsed.locations(), &["https://example.test/real".to_string()]);
    }
}
