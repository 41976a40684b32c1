//! Resolved state snapshot
//!
//! Writes the resolved model back in the input document's shape, with every
//! generated key and secret filled in. Feeding a snapshot back to genwg
//! reproduces the same bundle without generating anything.

use chrono::{DateTime, TimeZone};

use crate::config::{ClientEntry, Document, DocumentFormat, NamedEntry, ServerEntry, Udp2RawEntry};
use crate::error::Result;
use crate::model::{NetworkModel, Peer, Relay};

/// Suffix of snapshot files, after the timestamp
pub const SNAPSHOT_SUFFIX: &str = "genwg";

/// Convert the resolved model into a document
pub fn dump(model: &NetworkModel) -> Document {
    Document {
        servers: model.relays.iter().map(dump_relay).collect(),
    }
}

fn dump_relay(relay: &Relay) -> ServerEntry {
    ServerEntry {
        name: relay.name.clone(),
        proto: relay.transport,
        private_key: Some(relay.keys.private.clone()),
        ip: relay.endpoint.to_string(),
        port: i64::from(relay.port),
        net: relay.network.to_string(),
        mtu: i64::from(relay.mtu),
        udp2raw: relay.obfuscation.as_ref().map(|obfuscation| Udp2RawEntry {
            port: Some(i64::from(obfuscation.port)),
            secret: Some(obfuscation.secret.clone()),
        }),
        named: relay.dns.as_ref().map(|dns| NamedEntry {
            hostname: Some(dns.hostname.clone()),
            conf_dir: Some(dns.conf_dir.display().to_string()),
        }),
        extra_address: relay
            .extra_addresses
            .iter()
            .map(|addr| format!("{}/32", addr))
            .collect(),
        extra_allowed: relay.extra_allowed.iter().map(ToString::to_string).collect(),
        clients: relay.peers.iter().map(dump_peer).collect(),
    }
}

fn dump_peer(peer: &Peer) -> ClientEntry {
    let path = |p: &std::path::Path| p.display().to_string();
    ClientEntry {
        name: peer.name.clone(),
        private_key: Some(peer.keys.private.clone()),
        tcp: peer.obfuscated,
        android: peer.is_restricted(),
        bind: peer.uses_dns_zone(),
        append_extra: peer.append_extra,
        wg_handled_dns: peer.wg_handled_dns,
        root_zone_file: peer.root_zone_file.as_deref().map(path),
        wgquick_path: peer.restricted.as_ref().map(|r| path(&r.wgquick_path)),
        udp2raw_path: peer
            .restricted
            .as_ref()
            .and_then(|r| r.udp2raw_path.as_deref())
            .map(path),
        udp2raw_log_path: peer.obfuscation_log.as_deref().map(path),
        extra_allowed: peer.extra_allowed.iter().map(ToString::to_string).collect(),
    }
}

/// Serialize a document in the given format
pub fn to_string(document: &Document, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Yaml => Ok(serde_yaml::to_string(document)?),
        DocumentFormat::Toml => Ok(toml::to_string(document)?),
    }
}

/// Snapshot file name, e.g. `20240301_120000-genwg.yml`
pub fn snapshot_file_name<Tz: TimeZone>(at: &DateTime<Tz>, format: DocumentFormat) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}-{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        SNAPSHOT_SUFFIX,
        format.extension()
    )
}
