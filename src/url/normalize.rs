use crate::config::UrlsConfig;
use crate::url::host::is_valid_host;
use crate::UrlError;
use url::Url;

/// Normalizes a URL according to Sitelens' normalization rules
///
/// # Normalization Steps
///
/// 1. Trim whitespace; reject empty input
/// 2. Default the scheme to `https://` when none is given
/// 3. Parse the URL; reject if malformed
/// 4. Accept only `http` and `https`
/// 5. Validate the host against a conservative domain-label grammar
/// 6. Drop default ports (done by the parser)
/// 7. Strip trailing slashes from the path, except for root `/`
/// 8. Drop the fragment unless `keep_fragment` is set
/// 9. Drop an empty query string (trailing `?`)
/// 10. Reject paths ending in a blocked file extension
/// 11. Enforce `max_length` on the final URL
///
/// The result is stable: normalizing an already-normalized URL returns it unchanged.
///
/// # Examples
///
/// ```
/// use sitelens::config::UrlsConfig;
/// use sitelens::url::normalize_url;
///
/// let url = normalize_url("Example.COM:443/page/#top", &UrlsConfig::default()).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page");
/// ```
pub fn normalize_url(raw: &str, config: &UrlsConfig) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let candidate = with_default_scheme(trimmed)?;

    let mut url = Url::parse(&candidate).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?;
    if !is_valid_host(host) {
        return Err(UrlError::InvalidHost(host.to_string()));
    }

    let path = strip_trailing_slash(url.path());
    url.set_path(&path);

    if !config.keep_fragment {
        url.set_fragment(None);
    }

    if url.query() == Some("") {
        url.set_query(None);
    }

    if let Some(ext) = blocked_extension(&url, &config.blocked_extensions) {
        return Err(UrlError::BlockedExtension(ext));
    }

    let length = url.as_str().len();
    if length > config.max_length {
        return Err(UrlError::TooLong {
            length,
            max: config.max_length,
        });
    }

    Ok(url)
}

/// Prepends `https://` when the input carries no scheme of its own
///
/// `host:port` inputs are not mistaken for a scheme, while `mailto:`-style inputs are
/// passed through so the scheme check rejects them.
fn with_default_scheme(input: &str) -> Result<String, UrlError> {
    if input.contains("://") {
        return Ok(input.to_string());
    }

    if let Some(rest) = input.strip_prefix("//") {
        return Ok(format!("https://{}", rest));
    }

    if let Some((prefix, rest)) = input.split_once(':') {
        let looks_like_scheme = !prefix.is_empty()
            && prefix.chars().all(|c| c.is_ascii_alphanumeric() || "+.-".contains(c))
            && prefix.starts_with(|c: char| c.is_ascii_alphabetic())
            && !rest.starts_with(|c: char| c.is_ascii_digit());
        if looks_like_scheme && !prefix.contains('.') {
            return Err(UrlError::InvalidScheme(prefix.to_ascii_lowercase()));
        }
    }

    Ok(format!("https://{}", input))
}

fn strip_trailing_slash(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Returns the extension of the last path segment when it is on the block list
fn blocked_extension(url: &Url, blocked: &[String]) -> Option<String> {
    let last_segment = url.path().rsplit('/').next()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    blocked
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(&ext))
        .then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> Result<Url, UrlError> {
        normalize_url(raw, &UrlsConfig::default())
    }

    #[test]
    fn test_default_scheme_is_https() {
        let result = normalize("example.com/page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_protocol_relative() {
        let result = normalize("//example.com/page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_http_is_kept() {
        let result = normalize("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_host_with_port_is_not_a_scheme() {
        let result = normalize("example.com:8080/page").unwrap();
        assert_eq!(result.as_str(), "https://example.com:8080/page");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        assert_eq!(
            normalize("https://example.com/").unwrap().as_str(),
            "https://example.com/"
        );
        assert_eq!(
            normalize("https://example.com").unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_default_ports_stripped() {
        assert_eq!(
            normalize("https://example.com:443/a").unwrap().as_str(),
            "https://example.com/a"
        );
        assert_eq!(
            normalize("http://example.com:80/a").unwrap().as_str(),
            "http://example.com/a"
        );
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_fragment_when_configured() {
        let config = UrlsConfig {
            keep_fragment: true,
            ..UrlsConfig::default()
        };
        let result = normalize_url("https://example.com/page#section", &config).unwrap();
        assert_eq!(result.as_str(), "https://example.com/page#section");
    }

    #[test]
    fn test_lowercase_domain() {
        let result = normalize("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_query_is_preserved() {
        let result = normalize("https://example.com/search/?q=rust").unwrap();
        assert_eq!(result.as_str(), "https://example.com/search?q=rust");
    }

    #[test]
    fn test_invalid_scheme() {
        assert!(matches!(
            normalize("ftp://example.com/page"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(
            normalize("mailto:someone@example.com"),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_invalid_host() {
        assert!(matches!(
            normalize("https://exa_mple.com/"),
            Err(UrlError::InvalidHost(_)) | Err(UrlError::Parse(_))
        ));
        assert!(matches!(
            normalize("https://nodot/"),
            Err(UrlError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_blocked_extensions() {
        assert_eq!(
            normalize("https://example.com/files/report.PDF"),
            Err(UrlError::BlockedExtension("pdf".to_string()))
        );
        assert!(normalize("https://example.com/static/app.js").is_err());
        assert!(normalize("https://example.com/page.html").is_ok());
        assert!(normalize("https://example.com/v1.2/page").is_ok());
    }

    #[test]
    fn test_max_length() {
        let long = format!("https://example.com/{}", "a".repeat(3000));
        assert!(matches!(normalize(&long), Err(UrlError::TooLong { .. })));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize("   "), Err(UrlError::Empty));
    }

    #[test]
    fn test_idempotence() {
        let corpus = [
            "example.com",
            "example.com/",
            "https://example.com/blog/",
            "http://Example.com:80/a/b/?x=1#frag",
            "https://example.com:443/shop//",
            "  www.example.co.uk/path?q=a%20b  ",
            "https://127.0.0.1:8080/page/",
            "https://example.com/?",
        ];

        for raw in corpus {
            let once = normalize(raw).unwrap();
            let twice = normalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "normalization not idempotent for {}", raw);
        }
    }
}
