use std::collections::HashSet;

use ammonia::{Builder, UrlRelative};
use url::Url;

/// Build the ammonia sanitizer used for every `content`/`summary` byte
/// before it reaches the store. Configured once and reused, generalizing
/// the teacher's bare `ammonia::clean(body)` call into an explicit
/// allowlist matching spec §4.3.
///
/// `base`, when given, resolves every relative `href`/`src` (path-relative,
/// bare-relative, or protocol-relative) against it via ammonia's
/// `UrlRelative::RewriteWithBase`, per spec §4.3's "only absolute http/https
/// URLs are stored". Without a base, relative URLs are denied outright
/// (ammonia's default) rather than stored unresolved.
pub fn builder(base: Option<Url>) -> Builder<'static> {
    let mut tags = HashSet::new();
    tags.extend([
        "p", "br", "hr", "em", "strong", "i", "b", "u", "s", "del", "ins", "sub", "sup", "small",
        "ul", "ol", "li", "blockquote", "code", "pre", "h1", "h2", "h3", "h4", "h5", "h6", "table",
        "thead", "tbody", "tfoot", "tr", "th", "td", "a", "img", "span", "div",
    ]);

    let mut attrs = std::collections::HashMap::new();
    attrs.insert("a", ["href", "title"].into_iter().collect::<HashSet<_>>());
    attrs.insert(
        "img",
        ["src", "alt", "title"].into_iter().collect::<HashSet<_>>(),
    );

    let url_schemes: HashSet<&str> = ["http", "https"].into_iter().collect();

    let mut builder = Builder::default();
    builder
        .tags(tags)
        .tag_attributes(attrs)
        .url_schemes(url_schemes)
        .link_rel(Some("noopener noreferrer"))
        // No `<script>`, `<iframe>`, `<object>`, `<embed>`, `<base>`, `<meta>`
        // in the default tag set above — they are simply absent from the
        // allowlist, which strips them while preserving inner text.
        .clean_content_tags(["script", "style"].into_iter().collect())
        .url_relative(match base {
            Some(base) => UrlRelative::RewriteWithBase(base),
            None => UrlRelative::Deny,
        });

    builder
}

/// Sanitize a fragment of HTML per spec §4.3: safe UGC tags kept, every
/// other scheme than `http`/`https` stripped from URL-carrying attributes,
/// event handlers and dangerous elements removed, visible text preserved,
/// and any relative URL resolved against `base` (or denied if there is no
/// base to resolve it against).
pub fn clean(html: &str, base: Option<&Url>) -> String {
    builder(base.cloned()).clean(html).to_string()
}
