//! Conversation identifiers derived from the request.

use std::net::IpAddr;

use axum::http::HeaderMap;

pub const SESSION_HEADER: &str = "x-session-id";

const SESSION_PREFIX: &str = "session_";
const MAX_SESSION_ID_CHARS: usize = 64;

/// Trim, cut to 64 characters and keep only `[A-Za-z0-9_-]`.
///
/// Returns `None` when nothing is left.
pub fn normalize_session_id(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .take(MAX_SESSION_ID_CHARS)
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Resolve the conversation a request belongs to.
///
/// Order: the `x-session-id` header, then a client-supplied id from the
/// body, then the client address.
pub fn derive_conversation_id(
    headers: &HeaderMap,
    body_id: Option<&str>,
    client_ip: IpAddr,
) -> String {
    let header_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(normalize_session_id);
    if let Some(id) = header_id {
        return format!("{SESSION_PREFIX}{id}");
    }

    if let Some(id) = body_id.and_then(normalize_session_id) {
        // Ids we handed out come back already prefixed.
        if id.starts_with(SESSION_PREFIX) {
            return id;
        }
        return format!("{SESSION_PREFIX}{id}");
    }

    format!("ip_{client_ip}")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::http::HeaderValue,
        std::net::{Ipv4Addr, Ipv6Addr},
    };

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9));

    fn headers_with_session(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn normalizes_session_ids() {
        assert_eq!(normalize_session_id("  abc-123_X  ").as_deref(), Some("abc-123_X"));
        assert_eq!(normalize_session_id("a b.c/d").as_deref(), Some("abcd"));
        assert_eq!(normalize_session_id("!!!"), None);
        assert_eq!(normalize_session_id("   "), None);

        let long = "x".repeat(100);
        assert_eq!(normalize_session_id(&long).map(|s| s.len()), Some(64));
    }

    #[test]
    fn header_wins() {
        let headers = headers_with_session("tab-1");
        assert_eq!(
            derive_conversation_id(&headers, Some("other"), IP),
            "session_tab-1"
        );
    }

    #[test]
    fn unusable_header_falls_through() {
        let headers = headers_with_session("%%%");
        assert_eq!(derive_conversation_id(&headers, None, IP), "ip_203.0.113.9");
    }

    #[test]
    fn body_id_round_trips() {
        let headers = HeaderMap::new();
        assert_eq!(
            derive_conversation_id(&headers, Some("session_tab-1"), IP),
            "session_tab-1"
        );
        assert_eq!(
            derive_conversation_id(&headers, Some("tab-1"), IP),
            "session_tab-1"
        );
    }

    #[test]
    fn falls_back_to_client_address() {
        let headers = HeaderMap::new();
        assert_eq!(derive_conversation_id(&headers, None, IP), "ip_203.0.113.9");
        assert_eq!(
            derive_conversation_id(&headers, Some(""), IpAddr::V6(Ipv6Addr::LOCALHOST)),
            "ip_::1"
        );
    }
}
