//! Client IP extraction from proxy headers.

use crate::config::IpHeader;
use crate::context::RequestSnapshot;

/// Resolves the client IP from the configured header of `snapshot`.
///
/// Returns `None` when the header is missing or yields an empty value.
#[must_use]
pub fn client_ip(ip_header: IpHeader, snapshot: &RequestSnapshot) -> Option<String> {
    let raw = snapshot.header(ip_header.as_str())?;
    let ip = match ip_header {
        IpHeader::XForwardedFor => first_forwarded_for(raw),
        IpHeader::XRealIp => Some(raw.trim()),
        IpHeader::Forwarded => forwarded_for_token(raw),
    }?;
    (!ip.is_empty()).then(|| ip.to_string())
}

/// First comma-separated entry of an `X-Forwarded-For` value.
#[must_use]
pub fn first_forwarded_for(value: &str) -> Option<&str> {
    value.split(',').next().map(str::trim)
}

/// Node address from the first `for=` parameter of a `Forwarded` value.
///
/// Quotes are removed, IPv6 brackets and a trailing port are stripped:
/// `for="[2001:db8::1]:4711"` yields `2001:db8::1`, `for=192.0.2.60:80`
/// yields `192.0.2.60`. Obfuscated nodes (`unknown`, `_hidden`) yield `None`.
#[must_use]
pub fn forwarded_for_token(value: &str) -> Option<&str> {
    let element = value.split(',').next()?;
    let node = element.split(';').find_map(|pair| {
        let (key, val) = pair.split_once('=')?;
        key.trim().eq_ignore_ascii_case("for").then(|| val.trim())
    })?;
    let node = node.trim_matches('"');
    // RFC 7239 obfuscated identifiers carry no address.
    if node.is_empty() || node.eq_ignore_ascii_case("unknown") || node.starts_with('_') {
        return None;
    }

    if let Some(rest) = node.strip_prefix('[') {
        return rest.split_once(']').map(|(addr, _port)| addr);
    }
    // A single colon is an IPv4 host:port; more than one is a bare IPv6 address.
    match node.matches(':').count() {
        1 => node.split_once(':').map(|(host, _port)| host),
        _ => Some(node),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn snapshot(name: &str, value: &str) -> RequestSnapshot {
        RequestSnapshot::new().with_header(name, value)
    }

    #[test]
    fn x_forwarded_for_takes_first_entry() {
        let s = snapshot("x-forwarded-for", "1.1.1.1, 2.2.2.2");
        assert_eq!(client_ip(IpHeader::XForwardedFor, &s).as_deref(), Some("1.1.1.1"));
    }

    #[test]
    fn x_real_ip_is_verbatim() {
        let s = snapshot("X-Real-IP", " 10.0.0.7 ");
        assert_eq!(client_ip(IpHeader::XRealIp, &s).as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn forwarded_variants() {
        assert_eq!(forwarded_for_token("for=192.0.2.60;proto=http;by=203.0.113.43"), Some("192.0.2.60"));
        assert_eq!(forwarded_for_token("proto=https; For=\"[2001:db8:cafe::17]:4711\""), Some("2001:db8:cafe::17"));
        assert_eq!(forwarded_for_token("for=192.0.2.43:8080, for=198.51.100.17"), Some("192.0.2.43"));
        assert_eq!(forwarded_for_token("for=2001:db8::1"), Some("2001:db8::1"));
        assert_eq!(forwarded_for_token("proto=http;by=203.0.113.43"), None);
    }

    #[test]
    fn forwarded_obfuscated_identifiers_are_absent() {
        assert_eq!(forwarded_for_token("for=unknown"), None);
        assert_eq!(forwarded_for_token("for=\"_hidden\";proto=https"), None);
        assert_eq!(forwarded_for_token("for=_gazonk:8080"), None);
        assert_eq!(forwarded_for_token("for=\"\""), None);
        let s = snapshot("forwarded", "For=UNKNOWN, for=198.51.100.17");
        assert_eq!(client_ip(IpHeader::Forwarded, &s), None);
    }

    #[test]
    fn forwarded_through_snapshot() {
        let s = snapshot("forwarded", "for=\"198.51.100.17\";proto=https");
        assert_eq!(client_ip(IpHeader::Forwarded, &s).as_deref(), Some("198.51.100.17"));
    }

    #[test]
    fn missing_or_empty_header_is_absent() {
        assert_eq!(client_ip(IpHeader::XForwardedFor, &RequestSnapshot::new()), None);
        let s = snapshot("x-forwarded-for", " , 2.2.2.2");
        assert_eq!(client_ip(IpHeader::XForwardedFor, &s), None);
        let s = snapshot("x-real-ip", "1.1.1.1");
        assert_eq!(client_ip(IpHeader::XForwardedFor, &s), None);
    }

    proptest! {
        #[test]
        fn xff_first_entry_roundtrip(
            first in "[0-9]{1,3}(\\.[0-9]{1,3}){3}",
            rest in prop::collection::vec("[0-9]{1,3}(\\.[0-9]{1,3}){3}", 0..4),
        ) {
            let mut entries = vec![first.clone()];
            entries.extend(rest);
            let header = entries.join(", ");
            prop_assert_eq!(first_forwarded_for(&header), Some(first.as_str()));
        }
    }
}
