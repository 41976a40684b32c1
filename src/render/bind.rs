//! BIND zones served by relays with a `named` block

use std::fmt::Write as _;

use crate::model::{DnsSettings, NetworkModel, Relay};

/// Subdirectory of the BIND configuration directory holding generated zones
pub const ZONE_DIR: &str = "zone/genwg";

/// Name of the aggregated BIND include file
pub const INCLUDE_FILE: &str = "genwg.conf";

const TTL: &str = "5M";

/// File name of a reverse zone: its labels without the `in-addr.arpa` suffix
pub fn reverse_file_name(zone: &str) -> &str {
    match zone.strip_suffix(".in-addr.arpa") {
        Some(stem) if !stem.is_empty() => stem,
        _ => zone,
    }
}

fn soa(relay: &Relay) -> String {
    format!(
        "$TTL {ttl}\n@ IN SOA {name}. root.{name}. (\n\t1\t; serial\n\t1W\t; refresh\n\t1D\t; retry\n\t4W\t; expire\n\t1W )\t; negative ttl\n",
        ttl = TTL,
        name = relay.name
    )
}

fn ns(relay: &Relay, dns: &DnsSettings) -> String {
    format!("@ IN NS {}.{}.\n", dns.hostname, relay.name)
}

/// Forward zone named after the relay: the name server and every peer
pub fn forward_zone(relay: &Relay) -> Option<String> {
    let dns = relay.dns.as_ref()?;

    let mut zone = soa(relay);
    zone.push_str(&ns(relay, dns));
    zone.push('\n');
    let _ = writeln!(zone, "{}\tIN A\t{}", dns.hostname, relay.address);
    for peer in &relay.peers {
        let _ = writeln!(zone, "{}\tIN A\t{}", peer.name, peer.address);
    }
    Some(zone)
}

/// Reverse zone covering the relay network
pub fn reverse_zone(relay: &Relay) -> Option<String> {
    let dns = relay.dns.as_ref()?;

    let mut zone = soa(relay);
    zone.push_str(&ns(relay, dns));
    zone.push('\n');
    let _ = writeln!(
        zone,
        "{}\tIN PTR\t{}.{}.",
        dns.reverse_label, dns.hostname, relay.name
    );
    for peer in &relay.peers {
        if let Some(label) = &peer.reverse_label {
            let _ = writeln!(zone, "{}\tIN PTR\t{}.{}.", label, peer.name, relay.name);
        }
    }
    Some(zone)
}

/// `zone` stanzas for every zone of every DNS relay, for `named.conf` to include
pub fn named_include(model: &NetworkModel) -> Option<String> {
    if !model.serves_dns() {
        return None;
    }

    let mut conf = String::new();
    for relay in &model.relays {
        let Some(dns) = &relay.dns else {
            continue;
        };
        let dir = dns.conf_dir.join(ZONE_DIR);

        let _ = writeln!(conf, "// {}", relay.name);
        let _ = writeln!(
            conf,
            "zone \"{}\" {{ type master; file \"{}\"; }};",
            relay.name,
            dir.join(&relay.name).display()
        );
        let _ = writeln!(
            conf,
            "zone \"{}\" {{ type master; file \"{}\"; }};",
            dns.reverse_zone,
            dir.join(reverse_file_name(&dns.reverse_zone)).display()
        );
    }
    Some(conf)
}
