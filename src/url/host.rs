use std::net::Ipv4Addr;

/// Checks a host against a conservative domain-label grammar
///
/// Accepted hosts are:
/// - dotted domain names whose labels are 1–63 characters of ASCII letters, digits, and
///   inner hyphens, ending in an alphabetic (or punycode) top-level label
/// - `localhost`
/// - dotted-quad IPv4 addresses
///
/// # Examples
///
/// ```
/// use sitelens::url::is_valid_host;
///
/// assert!(is_valid_host("blog.example.com"));
/// assert!(is_valid_host("127.0.0.1"));
/// assert!(!is_valid_host("-bad-.com"));
/// ```
pub fn is_valid_host(host: &str) -> bool {
    if host == "localhost" || host.parse::<Ipv4Addr>().is_ok() {
        return true;
    }

    if host.is_empty() || host.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    if !labels.iter().all(|label| is_valid_label(label)) {
        return false;
    }

    labels
        .last()
        .map(|tld| {
            tld.len() >= 2 && (tld.chars().all(|c| c.is_ascii_alphabetic()) || tld.starts_with("xn--"))
        })
        .unwrap_or(false)
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Returns true when two hosts belong to the same site
///
/// Comparison ignores ASCII case and a leading `www.` on either side.
pub fn same_site(a: &str, b: &str) -> bool {
    fn bare(host: &str) -> &str {
        host.strip_prefix("www.").unwrap_or(host)
    }

    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();
    bare(&a) == bare(&b)
}
