//! Interface-config parsing and address classification.
//!
//! The cluster stores a VM's network settings as comma-separated `key=value`
//! strings (`virtio=AA:BB:...,bridge=vmbr0,ip=192.168.1.5/24`). This module
//! parses those strings, classifies the `ip` entries as private or public,
//! and selects the bootstrap address from a guest-agent interface report.
//! Malformed entries are skipped with a log line, never surfaced to callers.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::api::{AddressType, NetworkInterface, VmKind};

/// Hardware address the guest agent reports for loopback and virtual
/// interfaces; interfaces carrying it are never bootstrap targets.
pub const ZERO_HARDWARE_ADDRESS: &str = "00:00:00:00:00:00";

/// Addresses extracted from a VM's configuration, split by visibility.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IpInventory {
    /// Addresses within private, loopback, or link-local ranges.
    pub private: Vec<IpAddr>,
    /// Globally routable addresses.
    pub public: Vec<IpAddr>,
}

/// Parses a comma-separated `key=value` configuration string.
///
/// Items without an `=` separator are ignored; keys are unique within one
/// string, with later occurrences overwriting earlier ones.
#[must_use]
pub fn parse_kv_string(input: &str) -> BTreeMap<String, String> {
    input
        .split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            let (key, value) = trimmed.split_once('=')?;
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}

/// Extracts the host address from CIDR notation (`10.0.0.5/24`).
///
/// A bare address without a prefix length is accepted as well. Returns
/// `None` for unparsable input.
#[must_use]
pub fn host_address(cidr: &str) -> Option<IpAddr> {
    let host = cidr.split('/').next().unwrap_or(cidr);
    IpAddr::from_str(host.trim()).ok()
}

/// Reports whether an address belongs to a private range.
///
/// Loopback and link-local addresses count as private: they are never
/// reachable from outside the host, which is the distinction callers care
/// about when picking a bootstrap target.
#[must_use]
pub fn is_private(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let [first_segment, ..] = v6.segments();
            // fc00::/7 unique-local, fe80::/10 link-local.
            v6.is_loopback()
                || (first_segment & 0xfe00) == 0xfc00
                || (first_segment & 0xffc0) == 0xfe80
        }
    }
}

/// Collects the IP addresses recorded in a VM's configuration map.
///
/// Containers keep their addresses under `net*` keys, full VMs under
/// `ipconfig*`. Each matching value is parsed as a `key=value` string and
/// its `ip` entry classified; entries with an unparsable address are
/// skipped with a warning.
#[must_use]
pub fn parse_ip_configs(config: &BTreeMap<String, String>, kind: VmKind) -> IpInventory {
    let key_prefix = match kind {
        VmKind::Lxc => "net",
        VmKind::Qemu => "ipconfig",
    };

    let mut inventory = IpInventory::default();
    for value in config
        .iter()
        .filter(|(key, _)| key.starts_with(key_prefix))
        .map(|(_, value)| value)
    {
        let Some(cidr) = parse_kv_string(value).remove("ip") else {
            continue;
        };
        let Some(address) = host_address(&cidr) else {
            tracing::warn!(entry = %cidr, "ignoring interface config entry with invalid IP");
            continue;
        };
        if is_private(address) {
            inventory.private.push(address);
        } else {
            inventory.public.push(address);
        }
    }
    inventory
}

/// Selects the bootstrap address from a guest-agent interface report.
///
/// Interfaces with the all-zero hardware address are discarded, then the
/// first IPv4 address in report order wins. Addresses the agent reports in
/// a shape this driver cannot parse are skipped with a warning.
#[must_use]
pub fn first_bootstrap_ipv4(interfaces: &[NetworkInterface]) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .filter(|nic| nic.hardware_address != ZERO_HARDWARE_ADDRESS)
        .flat_map(|nic| &nic.ip_addresses)
        .filter(|entry| entry.address_type == AddressType::Ipv4)
        .find_map(|entry| {
            let parsed = Ipv4Addr::from_str(entry.address.trim()).ok();
            if parsed.is_none() {
                tracing::warn!(address = %entry.address, "ignoring unparsable agent-reported IPv4");
            }
            parsed
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AgentAddress;
    use rstest::rstest;

    fn nic(mac: &str, addresses: &[(AddressType, &str)]) -> NetworkInterface {
        NetworkInterface {
            name: None,
            hardware_address: mac.to_owned(),
            ip_addresses: addresses
                .iter()
                .map(|(address_type, address)| AgentAddress {
                    address_type: *address_type,
                    address: (*address).to_owned(),
                    prefix: None,
                })
                .collect(),
        }
    }

    #[test]
    fn kv_string_splits_settings() {
        let parsed = parse_kv_string("virtio=AA:BB,bridge=vmbr0,ip=10.0.0.5/24");
        assert_eq!(parsed.get("bridge").map(String::as_str), Some("vmbr0"));
        assert_eq!(parsed.get("ip").map(String::as_str), Some("10.0.0.5/24"));
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn kv_string_ignores_items_without_separator() {
        let parsed = parse_kv_string("dangling,ip=10.0.0.5/24,");
        assert_eq!(parsed.len(), 1);
    }

    #[rstest]
    #[case("192.168.1.5/24", true)]
    #[case("10.42.0.9/16", true)]
    #[case("127.0.0.1/8", true)]
    #[case("169.254.0.3/16", true)]
    #[case("8.8.8.8/32", false)]
    #[case("203.0.113.7/24", false)]
    fn ipv4_classification(#[case] cidr: &str, #[case] expect_private: bool) {
        let address = host_address(cidr).expect("parsable address");
        assert_eq!(is_private(address), expect_private);
    }

    #[rstest]
    #[case("fd12:3456::1/64", true)]
    #[case("fe80::1/64", true)]
    #[case("2001:db8::1/64", false)]
    fn ipv6_classification(#[case] cidr: &str, #[case] expect_private: bool) {
        let address = host_address(cidr).expect("parsable address");
        assert_eq!(is_private(address), expect_private);
    }

    #[test]
    fn malformed_cidr_is_skipped_not_fatal() {
        let mut config = BTreeMap::new();
        config.insert(
            String::from("ipconfig0"),
            String::from("ip=not-an-ip,gw=10.0.0.1"),
        );
        config.insert(
            String::from("ipconfig1"),
            String::from("ip=192.168.1.5/24"),
        );
        let inventory = parse_ip_configs(&config, VmKind::Qemu);
        assert_eq!(
            inventory.private,
            vec![host_address("192.168.1.5").expect("parsable")]
        );
        assert!(inventory.public.is_empty());
    }

    #[test]
    fn container_addresses_come_from_net_keys() {
        let mut config = BTreeMap::new();
        config.insert(String::from("net0"), String::from("ip=8.8.8.8/32"));
        config.insert(String::from("ipconfig0"), String::from("ip=10.0.0.1/8"));
        let inventory = parse_ip_configs(&config, VmKind::Lxc);
        assert_eq!(
            inventory.public,
            vec![host_address("8.8.8.8").expect("parsable")]
        );
        assert!(inventory.private.is_empty());
    }

    #[test]
    fn bootstrap_address_skips_zero_mac_interfaces() {
        let interfaces = vec![
            nic(ZERO_HARDWARE_ADDRESS, &[(AddressType::Ipv4, "127.0.0.1")]),
            nic(
                "aa:bb:cc:dd:ee:ff",
                &[(AddressType::Ipv6, "fe80::1"), (AddressType::Ipv4, "10.0.0.5")],
            ),
        ];
        assert_eq!(
            first_bootstrap_ipv4(&interfaces),
            Some(Ipv4Addr::new(10, 0, 0, 5))
        );
    }

    #[test]
    fn bootstrap_address_absent_when_only_ipv6() {
        let interfaces = vec![nic("aa:bb:cc:dd:ee:ff", &[(AddressType::Ipv6, "fe80::1")])];
        assert_eq!(first_bootstrap_ipv4(&interfaces), None);
    }
}
