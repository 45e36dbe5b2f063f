use lan_pulse_rs::addrparse::{is_valid_ipv4, parse_address_input};
use std::collections::HashSet;

#[test]
fn wildcard_sweep_is_a_full_slash_24() {
    let parsed = parse_address_input("192.168.1.xxx", None);
    assert_eq!(parsed.len(), 256);
    let unique: HashSet<_> = parsed.iter().map(|p| p.address.clone()).collect();
    assert_eq!(unique.len(), 256);
    for (i, p) in parsed.iter().enumerate() {
        assert_eq!(p.address, format!("192.168.1.{i}"));
        assert!(p.is_valid);
    }
}

#[test]
fn bare_ranges_with_prefix_keep_order() {
    let parsed = parse_address_input("1-5,10,20-22", Some("192.168.1"));
    let list: Vec<_> = parsed.iter().map(|p| p.address.as_str()).collect();
    assert_eq!(
        list,
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
fn dotted_range_expands_inclusively() {
    let parsed = parse_address_input("10.0.0.1-50", None);
    assert_eq!(parsed.len(), 50);
    assert_eq!(parsed.first().unwrap().address, "10.0.0.1");
    assert_eq!(parsed.last().unwrap().address, "10.0.0.50");
}

#[test]
fn out_of_range_literal_is_flagged_not_dropped() {
    let parsed = parse_address_input("999.1.1.1", None);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].address, "999.1.1.1");
    assert!(!parsed[0].is_valid);
}

#[test]
fn mixed_tokens_dedup_across_forms() {
    let parsed = parse_address_input("10.0.0.3, 10.0.0.1-4, 2", Some("10.0.0"));
    let list: Vec<_> = parsed.iter().map(|p| p.address.as_str()).collect();
    assert_eq!(list, vec!["10.0.0.3", "10.0.0.1", "10.0.0.2", "10.0.0.4"]);
}

#[test]
fn validity_requires_exactly_four_octets() {
    for ok in ["1.2.3.4", "0.0.0.0", "255.255.255.255", "10.0.0.01"] {
        assert!(is_valid_ipv4(ok), "{ok}");
    }
    for bad in ["1.2.3", "1.2.3.4.5", "1.2.3.256", "", "1.2.3.x", "1.2.3.-1", " 1.2.3.4"] {
        assert!(!is_valid_ipv4(bad), "{bad}");
    }
}
