//! Helpers for the scrape endpoint: SSRF guard and HTML cleanup.

use url::{Host, Url};

/// True when `raw` is an http(s) URL pointing at a public host.
///
/// Rejects localhost and any literal address in a private, loopback,
/// link-local, multicast, or otherwise non-routable range. Hostnames other
/// than `localhost` are assumed valid; resolution happens at fetch time.
pub fn is_public_url(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = parsed.host() else {
        return false;
    };

    match host {
        Host::Domain(domain) => !domain.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => {
            !(ip.is_private()
                || ip.is_loopback()
                || ip.is_link_local()
                || ip.is_broadcast()
                || ip.is_multicast()
                || ip.is_unspecified())
        }
        Host::Ipv6(ip) => {
            let segments = ip.segments();
            let unique_local = (segments[0] & 0xfe00) == 0xfc00;
            let link_local = (segments[0] & 0xffc0) == 0xfe80;
            !(ip.is_loopback()
                || ip.is_multicast()
                || ip.is_unspecified()
                || unique_local
                || link_local)
        }
    }
}

/// Strips HTML tags and normalizes whitespace.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                // Tag boundaries separate words.
                text.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max_bytes`, backing up to a character boundary.
pub fn truncate_to_boundary(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls() {
        assert!(is_public_url("https://example.com/page"));
        assert!(is_public_url("http://93.184.216.34/"));
    }

    #[test]
    fn test_non_public_urls_are_rejected() {
        assert!(!is_public_url("http://localhost:8080/"));
        assert!(!is_public_url("http://LOCALHOST/"));
        assert!(!is_public_url("http://127.0.0.1/"));
        assert!(!is_public_url("http://10.0.0.5/"));
        assert!(!is_public_url("http://192.168.1.1/"));
        assert!(!is_public_url("http://169.254.0.1/"));
        assert!(!is_public_url("http://[::1]/"));
        assert!(!is_public_url("http://[fc00::1]/"));
        assert!(!is_public_url("http://[fe80::1]/"));
        assert!(!is_public_url("ftp://example.com/"));
        assert!(!is_public_url("not a url"));
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("<html><body><p>Hello   <b>world</b></p></body></html>"),
            "Hello world"
        );
        assert_eq!(html_to_text("plain  text"), "plain text");
        assert_eq!(html_to_text("<script>alert(1)</script>after"), "alert(1) after");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllo".to_string();
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_to_boundary(text.clone(), 2), "h");
        assert_eq!(truncate_to_boundary(text.clone(), 3), "hé");
        assert_eq!(truncate_to_boundary(text.clone(), 100), "héllo");
    }
}
