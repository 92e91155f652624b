//! Picks the address to dial for a node, by priority over its advertised
//! address list. Pure, deterministic, does no I/O.

/// Mirrors `k8s-openapi`'s `NodeAddress.type_` values we accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Hostname,
    InternalDns,
    InternalIp,
    ExternalDns,
    ExternalIp,
}

impl AddressType {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Hostname" => Some(AddressType::Hostname),
            "InternalDNS" => Some(AddressType::InternalDns),
            "InternalIP" => Some(AddressType::InternalIp),
            "ExternalDNS" => Some(AddressType::ExternalDns),
            "ExternalIP" => Some(AddressType::ExternalIp),
            _ => None,
        }
    }
}

pub fn default_priority() -> Vec<AddressType> {
    vec![
        AddressType::Hostname,
        AddressType::InternalDns,
        AddressType::InternalIp,
        AddressType::ExternalDns,
        AddressType::ExternalIp,
    ]
}

/// One `(type, address)` entry from the node's status, as reported by the
/// API server (`status.addresses[]`).
#[derive(Debug, Clone)]
pub struct NodeAddress {
    pub type_raw: String,
    pub address: String,
}

/// Selects one address string from `addresses`, honouring `priority`
/// outermost: for each accepted type in priority order, return the first
/// matching entry in the node's own address-list order.
pub fn resolve(addresses: &[NodeAddress], priority: &[AddressType]) -> Option<String> {
    for wanted in priority {
        for candidate in addresses {
            if AddressType::parse(&candidate.type_raw) == Some(*wanted) {
                return Some(candidate.address.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(t: &str, a: &str) -> NodeAddress {
        NodeAddress { type_raw: t.to_string(), address: a.to_string() }
    }

    #[test]
    fn picks_highest_priority_present() {
        let addresses = vec![addr("ExternalIP", "A"), addr("InternalIP", "B"), addr("Hostname", "C")];
        let resolved = resolve(&addresses, &default_priority());
        assert_eq!(resolved.as_deref(), Some("C"));
    }

    #[test]
    fn falls_back_when_preferred_type_absent() {
        let addresses = vec![addr("ExternalIP", "A"), addr("InternalIP", "B")];
        let resolved = resolve(&addresses, &default_priority());
        assert_eq!(resolved.as_deref(), Some("B"));
    }

    #[test]
    fn respects_caller_supplied_priority_order() {
        let addresses = vec![addr("ExternalIP", "A"), addr("InternalIP", "B"), addr("Hostname", "C")];
        let priority = vec![AddressType::ExternalIp, AddressType::Hostname];
        let resolved = resolve(&addresses, &priority);
        assert_eq!(resolved.as_deref(), Some("A"));
    }

    #[test]
    fn no_accepted_type_present_returns_none() {
        let addresses = vec![addr("ExternalDNS", "d.example.com")];
        let priority = vec![AddressType::Hostname, AddressType::InternalIp];
        assert!(resolve(&addresses, &priority).is_none());
    }

    #[test]
    fn unrecognised_type_strings_are_ignored() {
        let addresses = vec![addr("Bogus", "x"), addr("Hostname", "good")];
        let resolved = resolve(&addresses, &default_priority());
        assert_eq!(resolved.as_deref(), Some("good"));
    }
}
