//! Process-wide compiled scanners. Built once on first use, read-only after.
//!
//! All patterns run over raw bytes with Unicode mode off, so `.` matches any
//! byte except `\n` and bodies need not be valid UTF-8.

use std::sync::LazyLock;

use regex::bytes::Regex;

/// `src=`, `href=` and `action=` attribute values, quoted or bare. Each
/// alternative captures the value in its own group.
pub static HTML_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?-u)\s(?i:action)=["']?(.*?)["'\s]|\s(?i:href)=["']?(.*?)["'\s]|\s(?i:src)=["']?(.*?)["'\s]"#,
    )
    .expect("HTML_ATTR_RE should compile")
});

/// The first `<base href=...>` declaration in a document.
pub static BASE_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)<base\s[^>]*?href\s*=\s*["']?([^"'\s>]+)"#).expect("BASE_HREF_RE should compile")
});

/// `url(...)` arguments in stylesheets, optionally quoted.
pub static CSS_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?-u)url\(["']?(.*?)["']?\)"#).expect("CSS_URL_RE should compile"));

#[cfg(test)]
mod tests {
    use super::*;

    fn captured<'a>(re: &Regex, haystack: &'a [u8]) -> Vec<&'a [u8]> {
        re.captures_iter(haystack)
            .filter_map(|caps| (1..caps.len()).find_map(|i| caps.get(i)))
            .map(|m| m.as_bytes())
            .collect()
    }

    #[test]
    fn test_html_attributes() {
        let html = br#"<a href="a.html">x</a><img src='b.png' /><form action=/post method=post><A HREF="c">"#;
        assert_eq!(
            captured(&HTML_ATTR_RE, html),
            vec![&b"a.html"[..], b"b.png", b"/post", b"c"]
        );
    }

    #[test]
    fn test_base_href() {
        let html = br#"<head><BASE target="_top" href="http://x.test/dir/"></head>"#;
        let caps = BASE_HREF_RE.captures(html).unwrap();
        assert_eq!(&caps[1], b"http://x.test/dir/");
    }

    #[test]
    fn test_css_urls() {
        let css = br#"a{background:url("a.png")} b{background:url('b.png')} c{background:url(c.png)}"#;
        assert_eq!(captured(&CSS_URL_RE, css), vec![&b"a.png"[..], b"b.png", b"c.png"]);
    }
}
