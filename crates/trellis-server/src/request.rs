//! Request facts from an incoming HTTP request
//!
//! The render context describes the request a template is rendered for:
//! its URL, preferred language, theme and timezone. Values taken from
//! headers are passed through unvalidated; the context builder rejects
//! malformed ones and falls back to the configured defaults.

use axum::http::{HeaderMap, Uri, header};
use trellis_template::{RequestFacts, UrlFacts};

/// Header carrying the client's theme choice.
pub const THEME_HEADER: &str = "x-trellis-theme";

/// Header carrying the client's IANA timezone.
pub const TIMEZONE_HEADER: &str = "x-trellis-timezone";

/// Derive render facts from a request. Requests are anonymous: sessions
/// are owned by whatever embeds the service.
pub fn request_facts(uri: &Uri, headers: &HeaderMap) -> RequestFacts {
    let host = header_str(headers, header::HOST.as_str())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default()
        .to_string();
    let protocol = header_str(headers, "x-forwarded-proto")
        .or_else(|| uri.scheme_str())
        .unwrap_or("http")
        .to_string();

    RequestFacts {
        user: None,
        url: UrlFacts {
            path: uri.path().to_string(),
            query: uri.query().unwrap_or_default().to_string(),
            host,
            protocol,
        },
        language: header_str(headers, header::ACCEPT_LANGUAGE.as_str())
            .and_then(preferred_language),
        theme: header_str(headers, THEME_HEADER).map(str::to_string),
        timezone: header_str(headers, TIMEZONE_HEADER).map(str::to_string),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The highest-weighted tag of an `Accept-Language` header. Ties go to the
/// earlier tag; `*` and zero weights are ignored.
pub fn preferred_language(accept: &str) -> Option<String> {
    let mut best: Option<(&str, f32)> = None;
    for entry in accept.split(',') {
        let mut parts = entry.split(';').map(str::trim);
        let Some(tag) = parts.next().filter(|t| !t.is_empty() && *t != "*") else {
            continue;
        };
        let weight = parts
            .find_map(|p| p.strip_prefix("q="))
            .and_then(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        if weight <= 0.0 {
            continue;
        }
        if best.is_none_or(|(_, w)| weight > w) {
            best = Some((tag, weight));
        }
    }
    best.map(|(tag, _)| tag.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_preferred_language() {
        assert_eq!(preferred_language("de-CH, en;q=0.8"), Some("de-CH".to_string()));
        assert_eq!(preferred_language("en;q=0.5, fr;q=0.9"), Some("fr".to_string()));
        assert_eq!(preferred_language("*, es"), Some("es".to_string()));
        assert_eq!(preferred_language("en;q=0"), None);
        assert_eq!(preferred_language(""), None);
    }

    #[test]
    fn test_request_facts_from_headers() {
        let uri: Uri = "/docs/page?tab=2".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("example.org"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("fr-CA,fr;q=0.9"));
        headers.insert(THEME_HEADER, HeaderValue::from_static("dark"));
        headers.insert(TIMEZONE_HEADER, HeaderValue::from_static("Europe/Paris"));

        let facts = request_facts(&uri, &headers);
        assert!(facts.user.is_none());
        assert_eq!(facts.url.path, "/docs/page");
        assert_eq!(facts.url.query, "tab=2");
        assert_eq!(facts.url.host, "example.org");
        assert_eq!(facts.url.protocol, "https");
        assert_eq!(facts.language.as_deref(), Some("fr-CA"));
        assert_eq!(facts.theme.as_deref(), Some("dark"));
        assert_eq!(facts.timezone.as_deref(), Some("Europe/Paris"));
    }

    #[test]
    fn test_request_facts_defaults() {
        let uri: Uri = "/".parse().unwrap();
        let facts = request_facts(&uri, &HeaderMap::new());
        assert_eq!(facts.url.protocol, "http");
        assert_eq!(facts.url.host, "");
        assert!(facts.language.is_none());
        assert!(facts.theme.is_none());
    }
}
