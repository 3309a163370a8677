//! Base-url helpers.
//!
//! A "base" is the scheme and authority of an absolute url
//! (`http://host:port`). Replay rebases urls onto another server and
//! comparison strips each side's own base from response bodies.

/// Scheme and authority of `url`, or `""` for relative urls.
pub fn base_url(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return "";
    };
    let authority_start = scheme_end + 3;
    match url[authority_start..].find('/') {
        Some(offset) => &url[..authority_start + offset],
        None => url,
    }
}

/// `url` without its base. Relative urls are returned unchanged.
pub fn strip_base(url: &str) -> &str {
    &url[base_url(url).len()..]
}

/// Move `url` onto `target_base`, keeping path and query.
///
/// Relative urls are anchored at `target_base`.
pub fn rebase(url: &str, target_base: &str) -> String {
    let target = target_base.trim_end_matches('/');
    let path = strip_base(url);
    if path.is_empty() || path.starts_with('/') {
        format!("{}{}", target, path)
    } else {
        format!("{}/{}", target, path)
    }
}

/// Remove every occurrence of `base` from `text`. An empty base is a no-op.
///
/// An occurrence only counts when it ends the base: the next character is
/// `/`, a quote, `<`, whitespace or the end of the text. `http://h:1` is
/// therefore left alone inside `http://h:10/...`.
pub fn strip_base_from_text(text: &str, base: &str) -> String {
    if base.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find(base) {
        let after = &rest[at + base.len()..];
        out.push_str(&rest[..at]);
        let bounded = match after.chars().next() {
            None => true,
            Some(c) => matches!(c, '/' | '"' | '\'' | '<') || c.is_whitespace(),
        };
        if !bounded {
            out.push_str(base);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}
