//! Model construction
//!
//! Resolves a validated [`Document`] into a [`NetworkModel`]. Relays are
//! processed in declaration order and each relay's peers in their own
//! declaration order, so the same document always yields the same addresses.
//! The first derivation failure aborts the build.

use std::net::IpAddr;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::{ClientEntry, Document, ServerEntry};
use crate::crypto::{KeyPair, KeyProvider};
use crate::error::{Error, Result};
use crate::model::{
    AddressAllocator, DnsSettings, Ipv4Net, NetworkModel, Obfuscation, Peer, Relay,
    RestrictedPlatform, Transport, MTU_MIN,
};

/// Builds the resolved model, asking `keys` for anything not supplied
pub struct ModelBuilder<'a> {
    keys: &'a dyn KeyProvider,
}

/// What a peer needs to know about the relay it belongs to
struct RelayScope<'r> {
    entity: &'r str,
    transport: Transport,
    network: Ipv4Net,
    serves_dns: bool,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(keys: &'a dyn KeyProvider) -> Self {
        Self { keys }
    }

    /// Resolve the whole document
    pub fn build(&self, document: &Document) -> Result<NetworkModel> {
        info!("Resolving {} server(s)", document.servers.len());
        let relays = document
            .servers
            .iter()
            .map(|server| self.build_relay(server))
            .collect::<Result<Vec<_>>>()?;

        let model = NetworkModel { relays };
        info!(
            "Resolved {} server(s) with {} client(s)",
            model.relays.len(),
            model.peer_count()
        );
        Ok(model)
    }

    fn build_relay(&self, entry: &ServerEntry) -> Result<Relay> {
        let entity = format!("server {}", entry.name);
        info!("Resolving {} ({})", entity, entry.proto);

        let keys = self.resolve_keys(&entity, entry.private_key.as_deref())?;

        let endpoint: IpAddr = entry
            .ip
            .parse()
            .map_err(|_| Error::derivation(&entity, format!("invalid ip address '{}'", entry.ip)))?;
        let port = port(&entity, "port", entry.port)?;

        let network = Ipv4Net::parse(&entry.net)
            .map_err(|reason| Error::derivation(&entity, format!("invalid net: {}", reason)))?;
        let mut allocator = AddressAllocator::new(network)
            .ok_or_else(|| Error::derivation(&entity, "network cannot be a /32"))?;
        let address = allocator.relay_address();

        let mtu = mtu(&entity, entry.proto, entry.mtu)?;
        let obfuscation = self.obfuscation(&entity, entry)?;

        let wants_dns = entry.named.is_some() || entry.clients.iter().any(|c| c.bind);
        let dns = if wants_dns {
            let named = entry.named.as_ref().ok_or_else(|| {
                Error::derivation(&entity, "named block is required when a client uses bind")
            })?;
            let hostname = named
                .hostname
                .clone()
                .ok_or_else(|| Error::derivation(&entity, "named.hostname is missing"))?;
            let conf_dir = named
                .conf_dir
                .as_ref()
                .map(PathBuf::from)
                .ok_or_else(|| Error::derivation(&entity, "named.conf_dir is missing"))?;
            let reverse_zone = network.reverse_zone();
            debug!("{} serves zones {} and {}", entity, entry.name, reverse_zone);
            Some(DnsSettings {
                hostname,
                conf_dir,
                reverse_zone,
                reverse_label: network.reverse_label(address),
            })
        } else {
            None
        };

        let extra_addresses = entry
            .extra_address
            .iter()
            .map(|literal| {
                let net = parse_net(&entity, "extra_address", literal)?;
                if !net.is_host() {
                    return Err(Error::derivation(
                        &entity,
                        format!("extra_address '{}' must be a /32", literal),
                    ));
                }
                Ok(net.base())
            })
            .collect::<Result<Vec<_>>>()?;

        let extra_allowed = entry
            .extra_allowed
            .iter()
            .map(|literal| {
                let net = parse_net(&entity, "extra_allowed", literal)?;
                if net.is_host() {
                    return Err(Error::derivation(
                        &entity,
                        format!("extra_allowed '{}' cannot be a /32, use extra_address", literal),
                    ));
                }
                Ok(net)
            })
            .collect::<Result<Vec<_>>>()?;

        let scope = RelayScope {
            entity: &entity,
            transport: entry.proto,
            network,
            serves_dns: dns.is_some(),
        };

        let mut peers = Vec::with_capacity(entry.clients.len());
        for client in &entry.clients {
            let peer_address = allocator.allocate().ok_or_else(|| {
                Error::derivation(
                    &entity,
                    format!("network {} has no address left for client {}", network, client.name),
                )
            })?;
            peers.push(self.build_peer(&scope, client, peer_address)?);
        }

        let mut peer_networks: Vec<Ipv4Net> = Vec::new();
        for net in peers.iter().flat_map(|p| p.extra_allowed.iter()) {
            if !peer_networks.contains(net) {
                peer_networks.push(*net);
            }
        }

        Ok(Relay {
            name: entry.name.clone(),
            transport: entry.proto,
            keys,
            endpoint,
            port,
            network,
            address,
            mtu,
            obfuscation,
            dns,
            extra_addresses,
            extra_allowed,
            peer_networks,
            peers,
        })
    }

    fn build_peer(
        &self,
        relay: &RelayScope<'_>,
        entry: &ClientEntry,
        address: std::net::Ipv4Addr,
    ) -> Result<Peer> {
        let entity = format!("client {} of {}", entry.name, relay.entity);
        debug!("Resolving {} at {}", entity, address);

        let keys = self.resolve_keys(&entity, entry.private_key.as_deref())?;

        if entry.bind && entry.android {
            return Err(Error::consistency(
                &entity,
                "bind and android are mutually exclusive",
            ));
        }

        let runs_udp2raw = entry.tcp && relay.transport == Transport::Obfuscated;

        let obfuscation_log = if runs_udp2raw {
            Some(required_path(&entity, "udp2raw_log_path", &entry.udp2raw_log_path)?)
        } else {
            None
        };

        let root_zone_file = if entry.bind {
            Some(required_path(&entity, "root_zone_file", &entry.root_zone_file)?)
        } else {
            None
        };

        let restricted = if entry.android {
            let wgquick_path = required_path(&entity, "wgquick_path", &entry.wgquick_path)?;
            let udp2raw_path = if runs_udp2raw {
                Some(required_path(&entity, "udp2raw_path", &entry.udp2raw_path)?)
            } else {
                None
            };
            Some(RestrictedPlatform {
                wgquick_path,
                udp2raw_path,
            })
        } else {
            None
        };

        let extra_allowed = entry
            .extra_allowed
            .iter()
            .map(|literal| parse_net(&entity, "extra_allowed", literal))
            .collect::<Result<Vec<_>>>()?;

        Ok(Peer {
            name: entry.name.clone(),
            keys,
            address,
            obfuscated: entry.tcp,
            obfuscation_log,
            root_zone_file,
            restricted,
            wg_handled_dns: entry.wg_handled_dns,
            append_extra: entry.append_extra,
            extra_allowed,
            reverse_label: relay
                .serves_dns
                .then(|| relay.network.reverse_label(address)),
        })
    }

    fn resolve_keys(&self, entity: &str, private: Option<&str>) -> Result<KeyPair> {
        if private.is_none() {
            info!("Generating keypair for {}", entity);
        }
        KeyPair::resolve(self.keys, private)
    }

    fn obfuscation(&self, entity: &str, entry: &ServerEntry) -> Result<Option<Obfuscation>> {
        let tcp_clients = entry.clients.iter().any(|c| c.tcp);
        let block = match (&entry.udp2raw, entry.proto) {
            (Some(block), _) => block,
            (None, Transport::Obfuscated) => {
                return Err(Error::derivation(
                    entity,
                    "udp2raw block with a port is required for a tcp server",
                ))
            }
            (None, Transport::Direct) if tcp_clients => {
                return Err(Error::derivation(
                    entity,
                    "udp2raw block with a port is required when a client uses tcp",
                ))
            }
            (None, Transport::Direct) => return Ok(None),
        };

        let udp2raw_port = block
            .port
            .ok_or_else(|| Error::derivation(entity, "udp2raw.port is missing"))?;
        let udp2raw_port = port(entity, "udp2raw.port", udp2raw_port)?;

        let secret = match &block.secret {
            Some(secret) => secret.clone(),
            None => {
                info!("Generating udp2raw secret for {}", entity);
                self.keys.generate_secret()?
            }
        };

        Ok(Some(Obfuscation {
            port: udp2raw_port,
            secret,
        }))
    }
}

fn port(entity: &str, field: &str, value: i64) -> Result<u16> {
    u16::try_from(value)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| {
            Error::derivation(entity, format!("{} {} is outside 1-65535", field, value))
        })
}

fn mtu(entity: &str, transport: Transport, value: i64) -> Result<u16> {
    let max = transport.mtu_max();
    u16::try_from(value)
        .ok()
        .filter(|mtu| (MTU_MIN..=max).contains(mtu))
        .ok_or_else(|| {
            Error::derivation(
                entity,
                format!(
                    "mtu {} is outside {}-{} for a {} server",
                    value, MTU_MIN, max, transport
                ),
            )
        })
}

fn parse_net(entity: &str, field: &str, literal: &str) -> Result<Ipv4Net> {
    Ipv4Net::parse(literal)
        .map_err(|reason| Error::derivation(entity, format!("invalid {}: {}", field, reason)))
}

fn required_path(entity: &str, field: &str, value: &Option<String>) -> Result<PathBuf> {
    value
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| Error::derivation(entity, format!("{} is required", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate;
    use crate::crypto::testing::{BrokenKeys, FixedKeys};
    use serde_json::{json, Value};
    use std::net::Ipv4Addr;

    fn server(overrides: Value) -> Value {
        let mut base = json!({
            "name": "wg0",
            "proto": "udp",
            "ip": "203.0.113.10",
            "port": 51820,
            "net": "10.0.0.0/24",
            "mtu": 1420,
            "priv": "relay-key",
            "clients": [
                {"name": "laptop", "priv": "laptop-key"},
                {"name": "phone", "priv": "phone-key"}
            ]
        });
        if let (Some(base), Some(overrides)) = (base.as_object_mut(), overrides.as_object()) {
            for (key, value) in overrides {
                base.insert(key.clone(), value.clone());
            }
        }
        base
    }

    fn build(servers: Vec<Value>) -> Result<NetworkModel> {
        let document = validate(&json!({ "servers": servers }))?;
        ModelBuilder::new(&FixedKeys::default()).build(&document)
    }

    fn derivation_reason(result: Result<NetworkModel>) -> String {
        match result {
            Err(Error::Derivation { reason, .. }) => reason,
            other => panic!("expected derivation error, got {:?}", other),
        }
    }

    #[test]
    fn test_one_relay_two_peers() {
        let model = build(vec![server(json!({}))]).unwrap();
        let relay = &model.relays[0];

        assert_eq!(relay.address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(relay.peers[0].name, "laptop");
        assert_eq!(relay.peers[0].address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(relay.peers[1].name, "phone");
        assert_eq!(relay.peers[1].address, Ipv4Addr::new(10, 0, 0, 3));
        assert_eq!(relay.keys.public, "pub(relay-key)");
        assert!(relay.obfuscation.is_none());
        assert!(relay.dns.is_none());
    }

    #[test]
    fn test_missing_keys_are_generated_once() {
        let document = validate(&json!({"servers": [server(json!({
            "priv": null,
            "clients": [{"name": "a"}, {"name": "b", "priv": "b-key"}, {"name": "c"}]
        }))]}))
        .unwrap();
        let keys = FixedKeys::default();
        let model = ModelBuilder::new(&keys).build(&document).unwrap();

        assert_eq!(keys.issued(), 3);
        let relay = &model.relays[0];
        assert_eq!(relay.keys.private, "priv-1");
        assert_eq!(relay.peers[0].keys.private, "priv-2");
        assert_eq!(relay.peers[1].keys.private, "b-key");
        assert_eq!(relay.peers[2].keys.private, "priv-3");
    }

    #[test]
    fn test_addresses_unique_per_relay() {
        let clients: Vec<Value> = (0..50).map(|i| json!({"name": format!("peer{}", i)})).collect();
        let model = build(vec![
            server(json!({"clients": clients.clone()})),
            server(json!({"name": "wg1", "net": "10.1.0.0/16", "clients": clients})),
        ])
        .unwrap();

        for relay in &model.relays {
            let mut seen = std::collections::HashSet::new();
            for peer in &relay.peers {
                assert!(relay.network.contains(peer.address));
                assert_ne!(peer.address, relay.address);
                assert!(seen.insert(peer.address));
            }
        }
        assert_eq!(model.relays[1].peers[0].address, Ipv4Addr::new(10, 1, 0, 2));
    }

    #[test]
    fn test_host_network_rejected() {
        let reason = derivation_reason(build(vec![server(json!({"net": "10.0.0.1/32"}))]));
        assert_eq!(reason, "network cannot be a /32");

        let reason = derivation_reason(build(vec![server(json!({"net": "10.0.0.1"}))]));
        assert_eq!(reason, "network cannot be a /32");
    }

    #[test]
    fn test_network_literal_host_bits_masked() {
        let model = build(vec![server(json!({"net": "10.0.0.77/24"}))]).unwrap();
        assert_eq!(model.relays[0].network.to_string(), "10.0.0.0/24");
        assert_eq!(model.relays[0].address, Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_invalid_literals() {
        let reason = derivation_reason(build(vec![server(json!({"ip": "203.0.113"}))]));
        assert_eq!(reason, "invalid ip address '203.0.113'");

        let reason = derivation_reason(build(vec![server(json!({"net": "10.0.0.0/40"}))]));
        assert!(reason.starts_with("invalid net"));

        let reason = derivation_reason(build(vec![server(json!({"port": 70000}))]));
        assert_eq!(reason, "port 70000 is outside 1-65535");

        let reason = derivation_reason(build(vec![server(json!({"port": 0}))]));
        assert_eq!(reason, "port 0 is outside 1-65535");
    }

    #[test]
    fn test_ipv6_endpoint() {
        let model = build(vec![server(json!({"ip": "2001:db8::1"}))]).unwrap();
        assert!(model.relays[0].endpoint.is_ipv6());
    }

    #[test]
    fn test_mtu_ceilings() {
        assert!(build(vec![server(json!({"mtu": 1460}))]).is_ok());
        let reason = derivation_reason(build(vec![server(json!({"mtu": 1461}))]));
        assert_eq!(reason, "mtu 1461 is outside 576-1460 for a udp server");

        let tcp = |mtu: i64| server(json!({"proto": "tcp", "mtu": mtu, "udp2raw": {"port": 4096}}));
        assert!(build(vec![tcp(1340)]).is_ok());
        let reason = derivation_reason(build(vec![tcp(1341)]));
        assert_eq!(reason, "mtu 1341 is outside 576-1340 for a tcp server");

        assert!(build(vec![server(json!({"mtu": 100}))]).is_err());
    }

    #[test]
    fn test_obfuscation_settings() {
        let reason = derivation_reason(build(vec![server(json!({"proto": "tcp", "mtu": 1300}))]));
        assert_eq!(reason, "udp2raw block with a port is required for a tcp server");

        let reason = derivation_reason(build(vec![server(json!({
            "proto": "tcp", "mtu": 1300, "udp2raw": {"secret": "s"}
        }))]));
        assert_eq!(reason, "udp2raw.port is missing");

        let model = build(vec![server(json!({
            "proto": "tcp", "mtu": 1300, "udp2raw": {"port": 4096}
        }))])
        .unwrap();
        assert_eq!(
            model.relays[0].obfuscation,
            Some(Obfuscation {
                port: 4096,
                secret: "secret-1".into()
            })
        );

        let model = build(vec![server(json!({
            "proto": "tcp", "mtu": 1300, "udp2raw": {"port": 4096, "secret": "kept"}
        }))])
        .unwrap();
        assert_eq!(model.relays[0].obfuscation.as_ref().unwrap().secret, "kept");
    }

    #[test]
    fn test_tcp_client_requires_relay_obfuscation() {
        // another relay offering tcp does not excuse the owning relay
        let tcp_relay = server(json!({
            "name": "wg1", "proto": "tcp", "mtu": 1300, "net": "10.1.0.0/24",
            "udp2raw": {"port": 4096}
        }));
        let udp_relay = server(json!({"clients": [{"name": "a", "tcp": true}]}));
        let reason = derivation_reason(build(vec![udp_relay, tcp_relay.clone()]));
        assert_eq!(reason, "udp2raw block with a port is required when a client uses tcp");

        let reason = derivation_reason(build(vec![server(json!({
            "udp2raw": {"secret": "s"},
            "clients": [{"name": "a", "tcp": true}]
        }))]));
        assert_eq!(reason, "udp2raw.port is missing");

        let model = build(vec![
            server(json!({"udp2raw": {"port": 4096}, "clients": [{"name": "a", "tcp": true}]})),
            tcp_relay,
        ])
        .unwrap();
        assert_eq!(
            model.relays[0].obfuscation,
            Some(Obfuscation {
                port: 4096,
                secret: "secret-1".into()
            })
        );
    }

    #[test]
    fn test_obfuscated_peer_paths() {
        let relay = |client: Value| {
            server(json!({
                "proto": "tcp", "mtu": 1300, "udp2raw": {"port": 4096},
                "clients": [client]
            }))
        };

        let reason = derivation_reason(build(vec![relay(json!({"name": "a", "tcp": true}))]));
        assert_eq!(reason, "udp2raw_log_path is required");

        let reason = derivation_reason(build(vec![relay(json!({
            "name": "a", "tcp": true, "android": true, "udp2raw_log_path": "/sdcard/u.log",
            "wgquick_path": "/system/bin/wg-quick"
        }))]));
        assert_eq!(reason, "udp2raw_path is required");

        let model = build(vec![relay(json!({
            "name": "a", "tcp": true, "android": true, "udp2raw_log_path": "/sdcard/u.log",
            "wgquick_path": "/system/bin/wg-quick", "udp2raw_path": "/data/udp2raw"
        }))])
        .unwrap();
        let peer = &model.relays[0].peers[0];
        assert!(peer.runs_udp2raw(&model.relays[0]));
        assert_eq!(
            peer.restricted.as_ref().and_then(|r| r.udp2raw_path.clone()),
            Some(PathBuf::from("/data/udp2raw"))
        );

        // tcp peers of a udp relay connect directly and need no udp2raw paths
        let model = build(vec![server(json!({
            "udp2raw": {"port": 4096},
            "clients": [{"name": "a", "tcp": true}]
        }))])
        .unwrap();
        let relay = &model.relays[0];
        assert!(relay.peers[0].obfuscated);
        assert!(!relay.peers[0].runs_udp2raw(relay));
        assert!(relay.peers[0].obfuscation_log.is_none());
    }

    #[test]
    fn test_bind_requires_named() {
        let reason = derivation_reason(build(vec![server(json!({
            "clients": [{"name": "a", "bind": true, "root_zone_file": "/etc/bind/db.root"}]
        }))]));
        assert_eq!(reason, "named block is required when a client uses bind");

        let reason = derivation_reason(build(vec![server(json!({
            "named": {"hostname": "ns"},
            "clients": [{"name": "a", "bind": true, "root_zone_file": "/etc/bind/db.root"}]
        }))]));
        assert_eq!(reason, "named.conf_dir is missing");

        let reason = derivation_reason(build(vec![server(json!({
            "named": {"hostname": "ns", "conf_dir": "/etc/bind"},
            "clients": [{"name": "a", "bind": true}]
        }))]));
        assert_eq!(reason, "root_zone_file is required");
    }

    #[test]
    fn test_dns_derivation() {
        let model = build(vec![server(json!({
            "net": "10.20.0.0/16",
            "named": {"hostname": "ns", "conf_dir": "/etc/bind"}
        }))])
        .unwrap();
        let relay = &model.relays[0];
        let dns = relay.dns.as_ref().unwrap();
        assert_eq!(dns.reverse_zone, "20.10.in-addr.arpa");
        assert_eq!(dns.reverse_label, "1.0");
        assert_eq!(relay.peers[0].reverse_label.as_deref(), Some("2.0"));
        assert_eq!(relay.peers[1].reverse_label.as_deref(), Some("3.0"));
    }

    #[test]
    fn test_bind_and_android_exclusive() {
        let result = build(vec![server(json!({
            "named": {"hostname": "ns", "conf_dir": "/etc/bind"},
            "clients": [{
                "name": "a", "bind": true, "android": true,
                "root_zone_file": "/etc/bind/db.root", "wgquick_path": "/bin/wg-quick"
            }]
        }))]);
        match result {
            Err(Error::Consistency { entity, reason }) => {
                assert_eq!(entity, "client a of server wg0");
                assert_eq!(reason, "bind and android are mutually exclusive");
            }
            other => panic!("expected consistency error, got {:?}", other),
        }
    }

    #[test]
    fn test_extra_networks() {
        let model = build(vec![server(json!({
            "extra_address": ["192.0.2.10", "192.0.2.11/32"],
            "extra_allowed": ["172.16.0.0/12"],
            "clients": [
                {"name": "a", "extra_allowed": ["192.168.1.0/24", "192.168.2.0/24"]},
                {"name": "b", "extra_allowed": ["192.168.2.0/24", "192.168.3.0/24"]}
            ]
        }))])
        .unwrap();
        let relay = &model.relays[0];
        assert_eq!(
            relay.extra_addresses,
            vec![Ipv4Addr::new(192, 0, 2, 10), Ipv4Addr::new(192, 0, 2, 11)]
        );
        let nets: Vec<String> = relay.peer_networks.iter().map(|n| n.to_string()).collect();
        assert_eq!(nets, vec!["192.168.1.0/24", "192.168.2.0/24", "192.168.3.0/24"]);

        let reason = derivation_reason(build(vec![server(json!({"extra_address": ["192.0.2.0/24"]}))]));
        assert_eq!(reason, "extra_address '192.0.2.0/24' must be a /32");

        let reason = derivation_reason(build(vec![server(json!({"extra_allowed": ["192.0.2.1/32"]}))]));
        assert_eq!(reason, "extra_allowed '192.0.2.1/32' cannot be a /32, use extra_address");
    }

    #[test]
    fn test_network_exhaustion() {
        let clients: Vec<Value> = (0..3).map(|i| json!({"name": format!("p{}", i)})).collect();
        let reason = derivation_reason(build(vec![server(json!({
            "net": "10.0.0.0/30", "clients": clients
        }))]));
        assert_eq!(reason, "network 10.0.0.0/30 has no address left for client p1");
    }

    #[test]
    fn test_key_provider_failure_passes_through() {
        let document = validate(&json!({"servers": [server(json!({"priv": null}))]})).unwrap();
        let err = ModelBuilder::new(&BrokenKeys).build(&document).unwrap_err();
        assert_eq!(err.to_string(), "Key provider failed: wg: command not found");
    }

    #[test]
    fn test_deterministic_with_supplied_keys() {
        let servers = vec![server(json!({"proto": "tcp", "mtu": 1300,
            "udp2raw": {"port": 4096, "secret": "s3cret"}}))];
        assert_eq!(build(servers.clone()).unwrap(), build(servers).unwrap());
    }
}
