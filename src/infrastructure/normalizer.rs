use chrono::{DateTime, Utc};
use feed_rs::model::{Entry as RawEntry, Feed as RawFeed};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::domain::models::{FeedMetadata, NewEntry};
use crate::infrastructure::sanitize;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("invalid feed document: {0}")]
    InvalidFeed(String),
}

/// Parse raw feed bytes (RSS 1.0/2.0, Atom, or JSON Feed — `feed-rs`
/// auto-detects the format so a single internal representation is produced
/// regardless of source) into feed metadata and a list of canonical
/// entries. `feed_url` is the base for relative-reference resolution and a
/// hash seed; `fetch_time` is the fallback timestamp for entries with no
/// date of their own.
///
/// A malformed document aborts with [`NormalizeError::InvalidFeed`] before
/// touching the store. A single malformed *entry* inside an otherwise valid
/// document is skipped; the rest of the feed still parses.
pub fn parse(
    bytes: &[u8],
    feed_url: &str,
    fetch_time: DateTime<Utc>,
) -> Result<(FeedMetadata, Vec<NewEntry>), NormalizeError> {
    let raw = feed_rs::parser::parse(bytes).map_err(|e| NormalizeError::InvalidFeed(e.to_string()))?;

    let base = Url::parse(feed_url).ok();
    let metadata = extract_feed_metadata(&raw, base.as_ref());

    let mut entries = Vec::with_capacity(raw.entries.len());
    for raw_entry in &raw.entries {
        if let Some(entry) = normalize_entry(raw_entry, feed_url, base.as_ref(), &raw, fetch_time)
        {
            entries.push(entry);
        }
    }

    Ok((metadata, entries))
}

fn extract_feed_metadata(raw: &RawFeed, base: Option<&Url>) -> FeedMetadata {
    let title = raw
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_default();
    let link = raw
        .links
        .first()
        .map(|l| resolve_url(&l.href, base).unwrap_or_else(|| l.href.clone()));
    FeedMetadata {
        title,
        link,
        updated: raw.updated,
    }
}

fn normalize_entry(
    entry: &RawEntry,
    feed_url: &str,
    base: Option<&Url>,
    raw_feed: &RawFeed,
    fetch_time: DateTime<Utc>,
) -> Option<NewEntry> {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_default();

    let link = entry
        .links
        .first()
        .map(|l| resolve_url(&l.href, base).unwrap_or_else(|| l.href.clone()));

    let published = entry
        .published
        .or(entry.updated)
        .or(raw_feed.updated)
        .unwrap_or(fetch_time)
        .with_timezone(&Utc);
    let updated = entry
        .updated
        .or(entry.published)
        .unwrap_or(published)
        .with_timezone(&Utc);

    let author = entry
        .authors
        .first()
        .map(|a| a.name.clone())
        .or_else(|| raw_feed.authors.first().map(|a| a.name.clone()))
        .unwrap_or_default();

    let (content, content_type) = extract_content(entry, base);
    let summary = entry
        .summary
        .as_ref()
        .map(|s| sanitize::clean(&s.content, base));

    let description = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .unwrap_or_default();

    let entry_id = derive_entry_id(entry, feed_url, &title, &published, &description, &content);

    Some(NewEntry {
        entry_id,
        title,
        link,
        author: if author.is_empty() { None } else { Some(author) },
        published,
        updated,
        content,
        content_type,
        summary,
    })
}

/// Entry-ID derivation per spec §4.3: the first matching rule wins.
fn derive_entry_id(
    entry: &RawEntry,
    feed_url: &str,
    title: &str,
    published: &DateTime<Utc>,
    description: &str,
    content: &Option<String>,
) -> String {
    if !entry.id.is_empty() {
        return entry.id.clone();
    }
    if let Some(link) = entry.links.first() {
        if !link.href.is_empty() {
            return link.href.clone();
        }
    }
    if !title.is_empty() {
        return hash16(&[feed_url, title, &published.to_rfc3339()]);
    }
    hash16(&[feed_url, description, content.as_deref().unwrap_or("")])
}

/// First 16 hex characters of SHA-256 over the concatenated parts, per
/// spec §4.3's hash-fallback rules.
fn hash16(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Atom's `type="xhtml"` content is parsed as XML (case-sensitive tags);
/// everything else (`html`, `text`, RSS/RDF description) is treated as HTML
/// and sanitized directly. Per spec §9's open question, the stored
/// `content_type` is always `"html"` — this aggregator does not yet
/// distinguish plain-text Atom content from HTML content.
fn extract_content(entry: &RawEntry, base: Option<&Url>) -> (Option<String>, String) {
    let Some(content) = &entry.content else {
        return (None, "html".to_string());
    };
    let Some(body) = &content.body else {
        return (None, "html".to_string());
    };

    let is_xhtml = content
        .content_type
        .to_string()
        .eq_ignore_ascii_case("application/xhtml+xml");

    let body = if is_xhtml {
        crate::infrastructure::xhtml::strip_unknown_elements(body)
    } else {
        body.clone()
    };

    (Some(sanitize::clean(&body, base)), "html".to_string())
}

fn resolve_url(href: &str, base: Option<&Url>) -> Option<String> {
    if let Ok(direct) = Url::parse(href) {
        return Some(direct.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATOM_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Feed</title>
  <link href="https://example.com/"/>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>First post</title>
    <id>urn:uuid:1</id>
    <link href="https://example.com/first"/>
    <updated>2024-01-02T00:00:00Z</updated>
    <content type="html">&lt;p&gt;ok&lt;/p&gt;&lt;script&gt;alert(1)&lt;/script&gt;&lt;a href="javascript:alert(1)"&gt;x&lt;/a&gt;</content>
  </entry>
</feed>"#;

    const RSS_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
<channel>
  <title>RSS Example</title>
  <link>https://example.com/</link>
  <item>
    <title>No guid, no link</title>
    <description>hello world</description>
  </item>
</channel>
</rss>"#;

    #[test]
    fn parses_atom_feed_and_sanitizes_content() {
        let fetch_time = Utc::now();
        let (meta, entries) = parse(ATOM_FEED.as_bytes(), "https://example.com/feed.xml", fetch_time)
            .expect("valid feed");
        assert_eq!(meta.title, "Example Feed");
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.entry_id, "urn:uuid:1");
        let content = entry.content.as_ref().unwrap();
        assert!(content.contains("<p>ok</p>"));
        assert!(!content.to_lowercase().contains("<script"));
        assert!(!content.contains("javascript:"));
    }

    #[test]
    fn falls_back_to_hash_id_when_no_guid_or_link() {
        let fetch_time = Utc::now();
        let (_meta, entries) =
            parse(RSS_FEED.as_bytes(), "https://example.com/feed.xml", fetch_time).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_id.len(), 16);
        assert!(entries[0].entry_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn entry_id_derivation_is_stable() {
        let fetch_time = Utc::now();
        let (_meta, entries1) =
            parse(RSS_FEED.as_bytes(), "https://example.com/feed.xml", fetch_time).unwrap();
        let (_meta, entries2) =
            parse(RSS_FEED.as_bytes(), "https://example.com/feed.xml", fetch_time).unwrap();
        assert_eq!(entries1[0].entry_id, entries2[0].entry_id);
    }

    #[test]
    fn invalid_document_is_reported_as_invalid_feed() {
        let err = parse(b"not a feed at all", "https://example.com/feed.xml", Utc::now())
            .unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidFeed(_)));
    }

    #[test]
    fn empty_but_well_formed_feed_yields_no_entries() {
        let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Empty</title><link>https://example.com/</link></channel></rss>"#;
        let (meta, entries) = parse(empty.as_bytes(), "https://example.com/feed.xml", Utc::now())
            .unwrap();
        assert_eq!(meta.title, "Empty");
        assert!(entries.is_empty());
    }

    #[test]
    fn date_fallback_uses_fetch_time_when_entry_and_feed_have_none() {
        let fetch_time = Utc::now();
        let (_meta, entries) =
            parse(RSS_FEED.as_bytes(), "https://example.com/feed.xml", fetch_time).unwrap();
        assert_eq!(entries[0].published, fetch_time);
    }
}
