//! Note Codec (spec §4.2) — bidirectional mapping between [`Memory`] and a
//! byte string.
//!
//! The header format is YAML-*like*, not YAML: it understands scalars, flow
//! sequences (`[a, b]`) and a fixed set of known keys. It never invokes an
//! arbitrary tag handler, so a malicious note body cannot trigger code
//! execution through the parser — this is a restriction, not a convenience.

use crate::error::CodecError;
use crate::model::{Domain, Memory, MemoryId, Namespace, Status};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const DELIMITER: &str = "---";

/// Serializes a memory into the on-disk note format. Deterministic: the same
/// input always produces byte-identical output, and header keys are always
/// written in the fixed order (namespace, timestamp, summary, spec, status,
/// tags, relates_to) per spec §4.2.
pub fn serialize(memory: &Memory) -> Vec<u8> {
    let mut header = String::new();
    header.push_str(DELIMITER);
    header.push('\n');
    header.push_str(&format!("namespace: {}\n", memory.namespace.as_str()));
    header.push_str(&format!(
        "timestamp: {}\n",
        memory.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ));
    header.push_str(&format!("summary: {}\n", escape_scalar(&memory.summary)));
    if let Some(spec) = &memory.spec {
        header.push_str(&format!("spec: {}\n", escape_scalar(spec)));
    }
    header.push_str(&format!("status: {}\n", memory.status.as_str()));
    if !memory.tags.is_empty() {
        let items = memory
            .tags
            .iter()
            .map(|t| escape_scalar(t))
            .collect::<Vec<_>>()
            .join(", ");
        header.push_str(&format!("tags: [{items}]\n"));
    }
    if !memory.relates_to.is_empty() {
        let ids = memory
            .relates_to
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        header.push_str(&format!("relates_to: {ids}\n"));
    }
    for (key, value) in &memory.extra {
        header.push_str(&format!("{key}: {}\n", escape_scalar(value)));
    }
    header.push_str(DELIMITER);
    header.push_str("\n\n");
    header.push_str(&memory.content);

    header.into_bytes()
}

/// Parses a previously-serialized note. Strict on required fields
/// (namespace, timestamp, summary); permissive on unknown header keys,
/// which are preserved in [`Memory::extra`].
pub fn parse(bytes: &[u8], id: MemoryId, domain: Domain) -> Result<Memory, CodecError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CodecError::new(format!("note body is not valid utf-8: {e}"), 0))?;

    let mut lines = text.lines();
    let first = lines.next().unwrap_or("");
    if first.trim_end() != DELIMITER {
        return Err(CodecError::new("missing opening '---' delimiter", 1));
    }

    let mut raw: BTreeMap<String, String> = BTreeMap::new();
    let mut key_order: Vec<String> = Vec::new();
    let mut line_no = 1usize;
    let mut closed = false;
    let mut body_start = 0usize;
    let mut consumed = first.len() + 1;

    for line in lines {
        line_no += 1;
        consumed += line.len() + 1;
        if line.trim_end() == DELIMITER {
            closed = true;
            body_start = consumed;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = split_header_line(line)
            .ok_or_else(|| CodecError::new(format!("malformed header line: {line:?}"), line_no))?;
        if !key_order.contains(&key) {
            key_order.push(key.clone());
        }
        raw.insert(key, value);
    }

    if !closed {
        return Err(CodecError::new("missing closing '---' delimiter", line_no));
    }

    let namespace_str = raw
        .get("namespace")
        .ok_or_else(|| CodecError::new("missing required field 'namespace'", 2))?;
    let namespace = Namespace::parse(namespace_str)
        .ok_or_else(|| CodecError::new(format!("unknown namespace: {namespace_str}"), 2))?;

    let timestamp_str = raw
        .get("timestamp")
        .ok_or_else(|| CodecError::new("missing required field 'timestamp'", 2))?;
    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(timestamp_str)
        .map_err(|e| CodecError::new(format!("invalid timestamp '{timestamp_str}': {e}"), 2))?
        .with_timezone(&Utc);

    let summary = unescape_scalar(
        raw.get("summary")
            .ok_or_else(|| CodecError::new("missing required field 'summary'", 2))?,
    );

    let spec = raw.get("spec").map(|s| unescape_scalar(s));
    let status = raw
        .get("status")
        .and_then(|s| Status::parse(s))
        .unwrap_or(Status::Active);

    let tags = raw
        .get("tags")
        .map(|s| parse_flow_sequence(s))
        .unwrap_or_default();

    let relates_to = raw
        .get("relates_to")
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| MemoryId(s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let known = [
        "namespace",
        "timestamp",
        "summary",
        "spec",
        "status",
        "tags",
        "relates_to",
    ];
    let mut extra = BTreeMap::new();
    for key in &key_order {
        if !known.contains(&key.as_str()) {
            if let Some(value) = raw.get(key) {
                extra.insert(key.clone(), unescape_scalar(value));
            }
        }
    }

    let content = text
        .get(body_start.min(text.len())..)
        .unwrap_or("")
        .trim_start_matches('\n')
        .to_string();

    Ok(Memory {
        id,
        namespace,
        domain,
        summary,
        content,
        timestamp,
        tags,
        spec,
        status,
        relates_to,
        extra,
    })
}

/// Splits a `key: value` header line. Rejects embedded tag indicators
/// (`!`, `&`, `*`) so the restricted parser never has to decide what to do
/// with a YAML tag/anchor/alias.
fn split_header_line(line: &str) -> Option<(String, String)> {
    let idx = line.find(':')?;
    let key = line[..idx].trim();
    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return None;
    }
    let value = line[idx + 1..].trim();
    if value.starts_with('!') || value.starts_with('&') || value.starts_with('*') {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Parses a YAML flow sequence `[a, b, c]` of bare or quoted scalars.
/// Duplicates are dropped (memory tags are an unordered set, spec §3).
fn parse_flow_sequence(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for item in inner.split(',') {
        let item = unescape_scalar(item.trim());
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

/// Quotes a scalar if it contains characters that would otherwise be
/// ambiguous in the flow grammar (`,`, `[`, `]`, `:`, leading/trailing space).
fn escape_scalar(value: &str) -> String {
    let needs_quoting = value.is_empty()
        || value.contains([',', '[', ']', ':', '#'])
        || value.starts_with(' ')
        || value.ends_with(' ');
    if needs_quoting {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn unescape_scalar(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1]
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    } else {
        value.to_string()
    }
}
