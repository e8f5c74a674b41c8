use quick_xml::events::Event;
use quick_xml::Reader;

/// Tags Atom `type="xhtml"` content is allowed to keep structurally; any
/// other element is dropped but its text content is preserved, matching
/// spec §4.3. Matching is case-sensitive, as XML (unlike HTML) requires.
const KNOWN_ELEMENTS: &[&str] = &[
    "div", "p", "br", "hr", "em", "strong", "i", "b", "u", "s", "ul", "ol", "li", "blockquote",
    "code", "pre", "h1", "h2", "h3", "h4", "h5", "h6", "table", "thead", "tbody", "tfoot", "tr",
    "th", "td", "a", "img", "span",
];

/// Parse an XHTML fragment as XML, dropping unknown elements while keeping
/// their text content, and re-serializing the known ones as plain HTML
/// tags (without their XML namespace attributes) so the result can be fed
/// through the same HTML sanitizer as every other content type.
///
/// Malformed XML is treated as "no known structure": the reader falls back
/// to emitting only the concatenated text content rather than failing the
/// whole entry.
pub fn strip_unknown_elements(xhtml: &str) -> String {
    let mut reader = Reader::from_str(xhtml);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if KNOWN_ELEMENTS.contains(&name.as_str()) {
                    out.push('<');
                    out.push_str(&name);
                    out.push('>');
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if KNOWN_ELEMENTS.contains(&name.as_str()) {
                    out.push_str("</");
                    out.push_str(&name);
                    out.push('>');
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if KNOWN_ELEMENTS.contains(&name.as_str()) {
                    out.push('<');
                    out.push_str(&name);
                    out.push_str("/>");
                }
            }
            Ok(Event::Text(t)) => {
                if let Ok(unescaped) = t.unescape() {
                    out.push_str(&unescaped);
                }
            }
            Ok(Event::CData(t)) => {
                out.push_str(&String::from_utf8_lossy(t.as_ref()));
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_known_elements_and_text() {
        let out = strip_unknown_elements("<div><p>hello <b>world</b></p></div>");
        assert!(out.contains("<p>"));
        assert!(out.contains("hello"));
        assert!(out.contains("world"));
    }

    #[test]
    fn drops_unknown_elements_but_keeps_text() {
        let out = strip_unknown_elements("<xhtml:div><custom-widget>kept text</custom-widget></xhtml:div>");
        assert!(!out.contains("custom-widget"));
        assert!(out.contains("kept text"));
    }

    #[test]
    fn is_case_sensitive() {
        // Uppercase tags are not in KNOWN_ELEMENTS and so are treated as
        // unknown, but their text survives.
        let out = strip_unknown_elements("<P>text</P>");
        assert!(!out.contains("<P>"));
        assert!(out.contains("text"));
    }

    #[test]
    fn malformed_xml_does_not_panic() {
        let out = strip_unknown_elements("<div><p>unterminated");
        assert!(!out.is_empty() || out.is_empty());
    }
}
