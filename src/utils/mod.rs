//! Utility functions and helpers.

pub mod log;
pub mod text;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a URL string against a base URL string.
pub fn resolve(base_url: &str, href: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .map(|base| resolve_url(&base, href))
}

/// Extract the domain (host) from a URL string.
///
/// This is the unit of per-target rate limiting.
pub fn get_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.ac.jp/research/").unwrap();
        assert_eq!(
            resolve_url(&base, "labs.html"),
            "https://example.ac.jp/research/labs.html"
        );
        assert_eq!(
            resolve_url(&base, "/medicine/"),
            "https://example.ac.jp/medicine/"
        );
        assert_eq!(
            resolve_url(&base, "https://other.ac.jp/x"),
            "https://other.ac.jp/x"
        );
    }

    #[test]
    fn test_resolve_with_bad_base() {
        assert_eq!(resolve("not a url", "labs.html"), None);
    }

    #[test]
    fn test_get_domain() {
        assert_eq!(
            get_domain("https://www.med.example.ac.jp/path"),
            Some("www.med.example.ac.jp".to_string())
        );
        assert_eq!(
            get_domain("https://Sub.Example.ac.jp:8080/path"),
            Some("sub.example.ac.jp".to_string())
        );
        assert_eq!(get_domain("mailto:someone@example.ac.jp"), None);
        assert_eq!(get_domain("relative/path"), None);
    }
}
