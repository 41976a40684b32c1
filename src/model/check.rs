//! Cross-entity consistency checks
//!
//! Runs on the complete model, after every relay and peer has been resolved,
//! and before anything is rendered.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::NetworkModel;

/// How findings that have a sensible fallback are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyPolicy {
    /// Every finding fails the run
    #[default]
    Strict,
    /// Findings with a fallback are logged as warnings
    Lenient,
}

/// Check invariants that span several relays or peers
pub fn check(model: &NetworkModel, policy: ConsistencyPolicy) -> Result<()> {
    let mut relay_names = HashSet::new();
    for relay in &model.relays {
        if !relay_names.insert(relay.name.as_str()) {
            return Err(Error::consistency(
                format!("server {}", relay.name),
                "server name is used more than once",
            ));
        }
    }

    let mut reverse_zones = HashSet::new();
    for relay in &model.relays {
        if let Some(dns) = &relay.dns {
            if !reverse_zones.insert(dns.reverse_zone.as_str()) {
                return Err(Error::consistency(
                    format!("server {}", relay.name),
                    format!("reverse zone {} is served by another server", dns.reverse_zone),
                ));
            }
        }
    }

    let offers_obfuscation = model.relays.iter().any(|r| r.is_obfuscated());
    let offers_dns = model.serves_dns();

    for relay in &model.relays {
        let relay_entity = format!("server {}", relay.name);
        let mut peer_names = HashSet::new();
        let mut addresses = HashSet::from([relay.address]);

        for peer in &relay.peers {
            let entity = format!("client {} of {}", peer.name, relay_entity);

            if !peer_names.insert(peer.name.as_str()) {
                return Err(Error::consistency(entity, "client name is used more than once"));
            }

            if !addresses.insert(peer.address) {
                return Err(Error::consistency(
                    entity,
                    format!("address {} is already assigned", peer.address),
                ));
            }

            if relay.dns.as_ref().is_some_and(|dns| dns.hostname == peer.name) {
                return Err(Error::consistency(
                    entity,
                    "client name clashes with the named hostname",
                ));
            }

            if peer.uses_dns_zone() && peer.is_restricted() {
                return Err(Error::consistency(entity, "bind and android are mutually exclusive"));
            }

            if peer.uses_dns_zone() && !offers_dns {
                return Err(Error::consistency(
                    entity,
                    "bind is requested but no server has a named block",
                ));
            }

            if peer.obfuscated && !relay.is_obfuscated() {
                if !offers_obfuscation {
                    let reason = "tcp is requested but no server uses the tcp transport";
                    match policy {
                        ConsistencyPolicy::Strict => return Err(Error::consistency(entity, reason)),
                        ConsistencyPolicy::Lenient => {
                            warn!("{}: {}, connecting over udp", entity, reason)
                        }
                    }
                } else {
                    warn!("{}: {} is a udp server, connecting over udp", entity, relay_entity);
                }
            }

            if peer.uses_dns_zone() && peer.wg_handled_dns {
                warn!("{}: bind takes precedence over wg_handled_dns", entity);
            }
        }
    }

    debug!("Consistency checks passed for {} server(s)", model.relays.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::model::{Ipv4Net, Peer, Relay, RestrictedPlatform, Transport};
    use std::net::{IpAddr, Ipv4Addr};
    use std::path::PathBuf;

    fn keys(name: &str) -> KeyPair {
        KeyPair {
            private: format!("{}-priv", name),
            public: format!("{}-pub", name),
        }
    }

    fn peer(name: &str, last_octet: u8) -> Peer {
        Peer {
            name: name.into(),
            keys: keys(name),
            address: Ipv4Addr::new(10, 0, 0, last_octet),
            obfuscated: false,
            obfuscation_log: None,
            root_zone_file: None,
            restricted: None,
            wg_handled_dns: false,
            append_extra: false,
            extra_allowed: Vec::new(),
            reverse_label: None,
        }
    }

    fn relay(name: &str, peers: Vec<Peer>) -> Relay {
        Relay {
            name: name.into(),
            transport: Transport::Direct,
            keys: keys(name),
            endpoint: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10)),
            port: 51820,
            network: Ipv4Net::parse("10.0.0.0/24").unwrap(),
            address: Ipv4Addr::new(10, 0, 0, 1),
            mtu: 1420,
            obfuscation: None,
            dns: None,
            extra_addresses: Vec::new(),
            extra_allowed: Vec::new(),
            peer_networks: Vec::new(),
            peers,
        }
    }

    fn reason(result: Result<()>) -> String {
        match result {
            Err(Error::Consistency { reason, .. }) => reason,
            other => panic!("expected consistency error, got {:?}", other),
        }
    }

    #[test]
    fn test_consistent_model() {
        let model = NetworkModel {
            relays: vec![relay("wg0", vec![peer("a", 2), peer("b", 3)])],
        };
        assert!(check(&model, ConsistencyPolicy::Strict).is_ok());
        assert!(check(&NetworkModel::default(), ConsistencyPolicy::Strict).is_ok());
    }

    #[test]
    fn test_duplicate_addresses() {
        let model = NetworkModel {
            relays: vec![relay("wg0", vec![peer("a", 2), peer("b", 2)])],
        };
        assert_eq!(
            reason(check(&model, ConsistencyPolicy::Strict)),
            "address 10.0.0.2 is already assigned"
        );

        let model = NetworkModel {
            relays: vec![relay("wg0", vec![peer("a", 1)])],
        };
        assert_eq!(
            reason(check(&model, ConsistencyPolicy::Lenient)),
            "address 10.0.0.1 is already assigned"
        );
    }

    #[test]
    fn test_duplicate_names() {
        let model = NetworkModel {
            relays: vec![relay("wg0", vec![]), relay("wg0", vec![])],
        };
        assert_eq!(
            reason(check(&model, ConsistencyPolicy::Strict)),
            "server name is used more than once"
        );

        let model = NetworkModel {
            relays: vec![relay("wg0", vec![peer("a", 2), peer("a", 3)])],
        };
        assert_eq!(
            reason(check(&model, ConsistencyPolicy::Strict)),
            "client name is used more than once"
        );

        // the same client name under different relays is fine
        let model = NetworkModel {
            relays: vec![relay("wg0", vec![peer("a", 2)]), relay("wg1", vec![peer("a", 2)])],
        };
        assert!(check(&model, ConsistencyPolicy::Strict).is_ok());
    }

    #[test]
    fn test_obfuscation_not_offered() {
        let mut tcp_peer = peer("a", 2);
        tcp_peer.obfuscated = true;
        let model = NetworkModel {
            relays: vec![relay("wg0", vec![tcp_peer])],
        };

        assert_eq!(
            reason(check(&model, ConsistencyPolicy::Strict)),
            "tcp is requested but no server uses the tcp transport"
        );
        assert!(check(&model, ConsistencyPolicy::Lenient).is_ok());
    }

    #[test]
    fn test_dns_zone_not_offered() {
        let mut bind_peer = peer("a", 2);
        bind_peer.root_zone_file = Some(PathBuf::from("/etc/bind/db.root"));
        let model = NetworkModel {
            relays: vec![relay("wg0", vec![bind_peer])],
        };
        assert_eq!(
            reason(check(&model, ConsistencyPolicy::Lenient)),
            "bind is requested but no server has a named block"
        );
    }

    #[test]
    fn test_hostname_clash() {
        let mut dns_relay = relay("wg0", vec![peer("ns", 2)]);
        dns_relay.dns = Some(crate::model::DnsSettings {
            hostname: "ns".into(),
            conf_dir: PathBuf::from("/etc/bind"),
            reverse_zone: "0.0.10.in-addr.arpa".into(),
            reverse_label: "1".into(),
        });
        let model = NetworkModel {
            relays: vec![dns_relay],
        };
        assert_eq!(
            reason(check(&model, ConsistencyPolicy::Strict)),
            "client name clashes with the named hostname"
        );
    }

    #[test]
    fn test_bind_and_android() {
        let mut both = peer("a", 2);
        both.root_zone_file = Some(PathBuf::from("/etc/bind/db.root"));
        both.restricted = Some(RestrictedPlatform {
            wgquick_path: PathBuf::from("/system/bin/wg-quick"),
            udp2raw_path: None,
        });
        let model = NetworkModel {
            relays: vec![relay("wg0", vec![both])],
        };
        assert_eq!(
            reason(check(&model, ConsistencyPolicy::Lenient)),
            "bind and android are mutually exclusive"
        );
    }
}
