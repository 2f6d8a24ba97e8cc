use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use url::Url;

/// Stable document id for a source URL.
///
/// The URL is canonicalized first (fragment dropped, trailing slash trimmed)
/// so trivially different spellings of the same page collapse to one id.
/// Strings that don't parse as URLs are encoded as given, minus surrounding
/// whitespace.
pub fn source_id(raw_url: &str) -> String {
    let trimmed = raw_url.trim();
    let canonical = match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => trimmed.to_string(),
    };
    URL_SAFE_NO_PAD.encode(canonical.as_bytes())
}

pub fn random_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_ignores_fragment_and_trailing_slash() {
        let a = source_id("https://example.org/news/123/");
        let b = source_id("https://example.org/news/123#comments");
        let c = source_id("  https://example.org/news/123 ");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn source_id_is_url_safe() {
        let id = source_id("https://example.org/?q=a+b&x=ÿÿÿ");
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn source_id_accepts_non_urls() {
        assert_eq!(source_id("manual entry"), URL_SAFE_NO_PAD.encode("manual entry"));
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(random_id(), random_id());
    }
}
