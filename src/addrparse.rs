use std::collections::HashSet;

use crate::error::InputError;
use crate::types::ParsedAddress;

/// Parse operator range input into a deduplicated list of candidate IPv4 addresses.
///
/// The input is split on commas and each token is classified on its own:
/// - wildcard: `192.168.1.xxx` expands to `.0` through `.255`
/// - dotted range: `10.0.0.1-50` expands the last octet inclusively
/// - literal: `10.0.0.7`, flagged invalid if it is not a dotted quad
/// - bare octet or octet range: `7` or `1-10`, appended to `default_prefix`
///
/// Malformed wildcard prefixes and malformed ranges produce nothing. Literal addresses
/// that fail validation are kept and flagged so the operator can see them. Without a
/// default prefix a bare token is returned as-is, flagged invalid.
///
/// Duplicates are removed, keeping the first occurrence.
pub fn parse_address_input(input: &str, default_prefix: Option<&str>) -> Vec<ParsedAddress> {
    let mut out: Vec<ParsedAddress> = Vec::new();
    let mut seen = HashSet::new();
    let default_prefix = default_prefix.map(str::trim).filter(|p| !p.is_empty());

    let mut push = |address: String, is_valid: bool| {
        if seen.insert(address.clone()) {
            out.push(ParsedAddress { address, is_valid });
        }
    };

    for token in input.split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }

        if token.contains("xxx") {
            let Some(prefix) = token.strip_suffix(".xxx") else {
                continue;
            };
            if !is_valid_prefix(prefix) {
                continue;
            }
            for octet in 0..=255u16 {
                push(format!("{prefix}.{octet}"), true);
            }
            continue;
        }

        if token.contains('.') {
            if token.contains('-') {
                // Range only applies to the last octet
                let Some((prefix, range)) = token.rsplit_once('.') else {
                    continue;
                };
                if !range.contains('-') {
                    continue;
                }
                let Some((start, end)) = parse_octet_range(range) else {
                    continue;
                };
                for octet in start..=end {
                    let address = format!("{prefix}.{octet}");
                    let valid = is_valid_ipv4(&address);
                    push(address, valid);
                }
            } else {
                push(token.to_string(), is_valid_ipv4(token));
            }
            continue;
        }

        match default_prefix {
            Some(prefix) => {
                let Some((start, end)) = parse_octet_range(token) else {
                    continue;
                };
                for octet in start..=end {
                    let address = format!("{prefix}.{octet}");
                    let valid = is_valid_ipv4(&address);
                    push(address, valid);
                }
            }
            None => push(token.to_string(), false),
        }
    }

    out
}

/// True iff `s` is exactly four dot-separated decimal integers, each in 0..=255.
pub fn is_valid_ipv4(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| parse_octet(p).is_some())
}

/// Parse, validate and cap input for the registration path.
///
/// Returns the addresses in first-seen order, or an error naming every invalid
/// candidate. Nothing is returned when any candidate is invalid.
pub fn validated_addresses(
    input: &str,
    default_prefix: Option<&str>,
    max: usize,
) -> Result<Vec<String>, InputError> {
    let parsed = parse_address_input(input, default_prefix);
    if parsed.is_empty() {
        return Err(InputError::Empty);
    }
    let invalid: Vec<String> = parsed
        .iter()
        .filter(|p| !p.is_valid)
        .map(|p| p.address.clone())
        .collect();
    if !invalid.is_empty() {
        return Err(InputError::InvalidAddresses(invalid));
    }
    if parsed.len() > max {
        return Err(InputError::TooMany {
            count: parsed.len(),
            max,
        });
    }
    Ok(parsed.into_iter().map(|p| p.address).collect())
}

/// Check an explicit list of addresses submitted for probing.
///
/// An empty list is accepted; callers treat it as a no-op.
pub fn check_probe_request(addresses: &[String], max: usize) -> Result<(), InputError> {
    if addresses.len() > max {
        return Err(InputError::TooMany {
            count: addresses.len(),
            max,
        });
    }
    let invalid: Vec<String> = addresses
        .iter()
        .filter(|a| !is_valid_ipv4(a))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(InputError::InvalidAddresses(invalid));
    }
    Ok(())
}

fn is_valid_prefix(prefix: &str) -> bool {
    let parts: Vec<&str> = prefix.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| parse_octet(p).is_some())
}

/// `7` or `1-10` (inclusive, start <= end, both within 0..=255).
fn parse_octet_range(s: &str) -> Option<(u8, u8)> {
    match s.split_once('-') {
        Some((a, b)) => {
            let start = parse_octet(a.trim())?;
            let end = parse_octet(b.trim())?;
            (start <= end).then_some((start, end))
        }
        None => {
            let octet = parse_octet(s.trim())?;
            Some((octet, octet))
        }
    }
}

fn parse_octet(s: &str) -> Option<u8> {
    if s.is_empty() || s.len() > 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u8>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(parsed: &[ParsedAddress]) -> Vec<&str> {
        parsed.iter().map(|p| p.address.as_str()).collect()
    }

    #[test]
    fn validity_check() {
        assert!(is_valid_ipv4("0.0.0.0"));
        assert!(is_valid_ipv4("255.255.255.255"));
        assert!(!is_valid_ipv4("256.1.1.1"));
        assert!(!is_valid_ipv4("1.1.1"));
        assert!(!is_valid_ipv4("1.1.1.1.1"));
        assert!(!is_valid_ipv4("1..1.1"));
        assert!(!is_valid_ipv4("a.b.c.d"));
        assert!(!is_valid_ipv4("-1.2.3.4"));
    }

    #[test]
    fn wildcard_expands_full_octet() {
        let parsed = parse_address_input("192.168.1.xxx", None);
        assert_eq!(parsed.len(), 256);
        assert!(parsed.iter().all(|p| p.is_valid));
        assert_eq!(parsed[0].address, "192.168.1.0");
        assert_eq!(parsed[255].address, "192.168.1.255");
    }

    #[test]
    fn bad_wildcard_prefix_is_dropped() {
        assert!(parse_address_input("192.168.xxx", None).is_empty());
        assert!(parse_address_input("300.1.1.xxx", None).is_empty());
    }

    #[test]
    fn bare_tokens_use_default_prefix() {
        let parsed = parse_address_input("1-5,10,20-22", Some("192.168.1"));
        assert_eq!(
            addresses(&parsed),
            vec![
                "192.168.1.1",
                "192.168.1.2",
                "192.168.1.3",
                "192.168.1.4",
                "192.168.1.5",
                "192.168.1.10",
                "192.168.1.20",
                "192.168.1.21",
                "192.168.1.22",
            ]
        );
        assert!(parsed.iter().all(|p| p.is_valid));
    }

    #[test]
    fn bare_token_without_prefix_is_flagged() {
        let parsed = parse_address_input("7", None);
        assert_eq!(
            parsed,
            vec![ParsedAddress {
                address: "7".into(),
                is_valid: false
            }]
        );
    }

    #[test]
    fn dotted_range_and_dedup() {
        let parsed = parse_address_input("10.0.0.1-3, 10.0.0.2, 10.0.0.9", None);
        assert_eq!(
            addresses(&parsed),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.9"]
        );
    }

    #[test]
    fn malformed_ranges_yield_nothing() {
        assert!(parse_address_input("10.0.0.9-3", None).is_empty());
        assert!(parse_address_input("10.0.0.1-300", None).is_empty());
        assert!(parse_address_input("10.0.0.a-b", None).is_empty());
        assert!(parse_address_input("9-3", Some("10.0.0")).is_empty());
    }

    #[test]
    fn dash_outside_last_octet_yields_nothing() {
        assert!(parse_address_input("10.0-1.0.5", None).is_empty());
        assert!(parse_address_input("-1.2.3.4", None).is_empty());
        assert_eq!(
            addresses(&parse_address_input("10.0-1.0.5, 10.0.0.5", None)),
            vec!["10.0.0.5"]
        );
    }

    #[test]
    fn short_prefix_range_is_flagged_invalid() {
        let parsed = parse_address_input("10.0.1-2", None);
        assert_eq!(addresses(&parsed), vec!["10.0.1", "10.0.2"]);
        assert!(parsed.iter().all(|p| !p.is_valid));
    }

    #[test]
    fn blank_input_is_empty() {
        assert!(parse_address_input("   ", Some("10.0.0")).is_empty());
        assert!(parse_address_input("", None).is_empty());
    }

    #[test]
    fn registration_rejects_invalid_and_oversized() {
        assert_eq!(validated_addresses(" ", None, 500), Err(InputError::Empty));
        assert_eq!(
            validated_addresses("10.0.0.1,999.1.1.1", None, 500),
            Err(InputError::InvalidAddresses(vec!["999.1.1.1".into()]))
        );
        assert_eq!(
            validated_addresses("10.0.0.xxx,10.0.1.xxx", None, 500),
            Err(InputError::TooMany { count: 512, max: 500 })
        );
        assert_eq!(
            validated_addresses("1-2", Some("10.0.0"), 500).unwrap(),
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
        );
    }

    #[test]
    fn probe_request_checks() {
        let ok = vec!["10.0.0.1".to_string()];
        assert!(check_probe_request(&ok, 500).is_ok());
        assert!(check_probe_request(&[], 500).is_ok());
        let bad = vec!["10.0.0.1".to_string(), "nope".to_string()];
        assert_eq!(
            check_probe_request(&bad, 500),
            Err(InputError::InvalidAddresses(vec!["nope".into()]))
        );
        assert!(matches!(
            check_probe_request(&ok, 0),
            Err(InputError::TooMany { count: 1, max: 0 })
        ));
    }
}
