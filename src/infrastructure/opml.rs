use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use crate::domain::models::Feed;

#[derive(Error, Debug)]
pub enum OpmlError {
    #[error("malformed OPML document: {0}")]
    Parse(String),
    #[error("xml write error: {0}")]
    Write(#[from] quick_xml::Error),
}

/// One `<outline>` entry extracted from an imported OPML document, ready to
/// be handed to `Store::add_feed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedFeed {
    pub title: String,
    pub xml_url: String,
}

/// Parse an OPML document, collecting every `outline` element that carries
/// an `xmlUrl` attribute (the OPML convention for a feed subscription).
/// Outlines without one (folders, plain bookmarks) are skipped.
pub fn import(xml: &str) -> Result<Vec<ImportedFeed>, OpmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| OpmlError::Parse(e.to_string()))?
        {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"outline" => {
                let mut xml_url = None;
                let mut title = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"xmlUrl" => {
                            xml_url = Some(
                                attr.decode_and_unescape_value(reader.decoder())
                                    .map_err(|err| OpmlError::Parse(err.to_string()))?
                                    .into_owned(),
                            );
                        }
                        b"title" | b"text" if title.is_none() => {
                            title = Some(
                                attr.decode_and_unescape_value(reader.decoder())
                                    .map_err(|err| OpmlError::Parse(err.to_string()))?
                                    .into_owned(),
                            );
                        }
                        _ => {}
                    }
                }
                if let Some(xml_url) = xml_url {
                    feeds.push(ImportedFeed {
                        title: title.unwrap_or_else(|| xml_url.clone()),
                        xml_url,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(feeds)
}

/// Serialize the given feeds as an OPML 2.0 document, one `<outline>` per
/// feed, for the `export-opml` CLI subcommand.
pub fn export(feeds: &[Feed]) -> Result<String, OpmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    writer
        .create_element("opml")
        .with_attribute(("version", "2.0"))
        .write_inner_content::<_, quick_xml::Error>(|writer| {
            writer
                .create_element("head")
                .write_inner_content(|writer| {
                    writer
                        .create_element("title")
                        .write_text_content(BytesText::new("planetd subscriptions"))?;
                    Ok(())
                })?;
            writer
                .create_element("body")
                .write_inner_content(|writer| {
                    for feed in feeds {
                        let mut element = writer
                            .create_element("outline")
                            .with_attribute(("type", "rss"))
                            .with_attribute(("text", feed.title.as_str()))
                            .with_attribute(("title", feed.title.as_str()))
                            .with_attribute(("xmlUrl", feed.url.as_str()));
                        if let Some(link) = &feed.link {
                            element = element.with_attribute(("htmlUrl", link.as_str()));
                        }
                        element.write_empty()?;
                    }
                    Ok(())
                })?;
            Ok(())
        })?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| OpmlError::Parse(e.to_string()))
}
