//! Input document validation
//!
//! Turns the untyped tree into a [`Document`]. Presence, blankness, types and
//! name formats are checked here; literal parsing and range checks happen in
//! the model builder. Every finding is collected before giving up so the
//! operator sees the complete list in one run.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::fields::{Findings, Record};
use crate::config::{ClientEntry, Document, NamedEntry, ServerEntry, Udp2RawEntry};
use crate::error::{Error, Result};
use crate::model::{is_dns_label, is_file_safe_name, is_interface_name, Transport};

const TOP_LEVEL_KEYS: &[&str] = &["servers"];

const SERVER_KEYS: &[&str] = &[
    "name",
    "proto",
    "priv",
    "ip",
    "port",
    "net",
    "mtu",
    "udp2raw",
    "named",
    "extra_address",
    "extra_allowed",
    "clients",
];

const UDP2RAW_KEYS: &[&str] = &["port", "secret"];

const NAMED_KEYS: &[&str] = &["hostname", "conf_dir"];

const CLIENT_KEYS: &[&str] = &[
    "name",
    "priv",
    "tcp",
    "android",
    "bind",
    "append_extra",
    "wg_handled_dns",
    "root_zone_file",
    "wgquick_path",
    "udp2raw_path",
    "udp2raw_log_path",
    "extra_allowed",
];

/// Private key value asking for a fresh key
const GENERATE_KEY: &str = "generate";

/// Validate the untyped document tree
pub fn validate(tree: &Value) -> Result<Document> {
    let mut findings = Findings::default();

    let Some(root) = Record::new("", tree, &mut findings) else {
        return Err(Error::Validation(findings.into_inner()));
    };
    warn_unknown(&root, TOP_LEVEL_KEYS);

    if !root.contains("servers") {
        findings.push("servers", "is missing");
    }

    let mut servers = Vec::new();
    for (path, value) in root.list("servers", &mut findings) {
        if let Some(server) = validate_server(&path, value, &mut findings) {
            servers.push(server);
        }
    }

    if !findings.is_empty() {
        return Err(Error::Validation(findings.into_inner()));
    }

    if servers.is_empty() {
        warn!("No servers defined, nothing to generate");
    }
    debug!("Validated {} server(s)", servers.len());
    Ok(Document { servers })
}

fn validate_server(path: &str, value: &Value, findings: &mut Findings) -> Option<ServerEntry> {
    let record = Record::new(path, value, findings)?;
    warn_unknown(&record, SERVER_KEYS);

    let name = record.required::<String>("name", findings);
    let proto = record
        .required::<String>("proto", findings)
        .and_then(|proto| match Transport::parse(&proto) {
            Some(transport) => Some(transport),
            None => {
                findings.push(
                    record.field_path("proto"),
                    format!("'{}' is not one of udp, tcp, direct, obfuscated", proto),
                );
                None
            }
        });
    let private_key = private_key(&record, findings);
    let ip = record.required::<String>("ip", findings);
    let port = record.required::<i64>("port", findings);
    let net = record.required::<String>("net", findings);
    let mtu = record.required::<i64>("mtu", findings);

    let udp2raw = sub_record(&record, "udp2raw", UDP2RAW_KEYS, findings, |block, findings| {
        Udp2RawEntry {
            port: block.optional("port", findings),
            secret: block.optional("secret", findings),
        }
    });
    let named = sub_record(&record, "named", NAMED_KEYS, findings, |block, findings| {
        NamedEntry {
            hostname: block.optional("hostname", findings),
            conf_dir: block.optional("conf_dir", findings),
        }
    });

    let extra_address = record.or_default::<Vec<String>>("extra_address", findings);
    let extra_allowed = record.or_default::<Vec<String>>("extra_allowed", findings);

    let mut clients = Vec::new();
    for (client_path, client_value) in record.list("clients", findings) {
        if let Some(client) = validate_client(&client_path, client_value, findings) {
            clients.push((client_path, client));
        }
    }

    let wants_dns = named.is_some() || clients.iter().any(|(_, c)| c.bind);

    if let Some(name) = &name {
        if !is_interface_name(name) {
            findings.push(
                record.field_path("name"),
                "must be 1-15 characters of [A-Za-z0-9_=+.-]",
            );
        } else if wants_dns && !is_dns_label(name) {
            findings.push(
                record.field_path("name"),
                "must be a valid DNS label when DNS is enabled",
            );
        }
    }

    if let Some(hostname) = named.as_ref().and_then(|n| n.hostname.as_ref()) {
        if !is_dns_label(hostname) {
            findings.push(
                format!("{}.hostname", record.field_path("named")),
                "must be a valid DNS label",
            );
        }
    }

    for (client_path, client) in &clients {
        if !is_file_safe_name(&client.name) {
            findings.push(
                format!("{}.name", client_path),
                "must only contain characters of [A-Za-z0-9_=+.-]",
            );
        } else if wants_dns && !is_dns_label(&client.name) {
            findings.push(
                format!("{}.name", client_path),
                "must be a valid DNS label when DNS is enabled",
            );
        }
    }

    Some(ServerEntry {
        name: name?,
        proto: proto?,
        private_key,
        ip: ip?,
        port: port?,
        net: net?,
        mtu: mtu?,
        udp2raw,
        named,
        extra_address,
        extra_allowed,
        clients: clients.into_iter().map(|(_, c)| c).collect(),
    })
}

fn validate_client(path: &str, value: &Value, findings: &mut Findings) -> Option<ClientEntry> {
    let record = Record::new(path, value, findings)?;
    warn_unknown(&record, CLIENT_KEYS);

    let name = record.required::<String>("name", findings);
    let client = ClientEntry {
        name: String::new(),
        private_key: private_key(&record, findings),
        tcp: record.flag("tcp", findings),
        android: record.flag("android", findings),
        bind: record.flag("bind", findings),
        append_extra: record.flag("append_extra", findings),
        wg_handled_dns: record.flag("wg_handled_dns", findings),
        root_zone_file: record.optional("root_zone_file", findings),
        wgquick_path: record.optional("wgquick_path", findings),
        udp2raw_path: record.optional("udp2raw_path", findings),
        udp2raw_log_path: record.optional("udp2raw_log_path", findings),
        extra_allowed: record.or_default("extra_allowed", findings),
    };

    Some(ClientEntry {
        name: name?,
        ..client
    })
}

/// Supplied private key; blank or `generate` asks for a fresh one
fn private_key(record: &Record<'_>, findings: &mut Findings) -> Option<String> {
    let blank = record
        .get("priv")
        .and_then(Value::as_str)
        .is_some_and(|key| key.trim().is_empty());
    if blank {
        return None;
    }
    record
        .optional::<String>("priv", findings)
        .filter(|key| !key.eq_ignore_ascii_case(GENERATE_KEY))
}

fn sub_record<T>(
    record: &Record<'_>,
    key: &str,
    known: &[&str],
    findings: &mut Findings,
    read: impl FnOnce(&Record<'_>, &mut Findings) -> T,
) -> Option<T> {
    let value = record.get(key)?;
    let path = record.field_path(key);
    let block = Record::new(&path, value, findings)?;
    warn_unknown(&block, known);
    Some(read(&block, findings))
}

fn warn_unknown(record: &Record<'_>, known: &[&str]) {
    for key in record.unknown_keys(known) {
        warn!("Ignoring unknown key {}", key);
    }
}
