//! Capture-marker recognition in free-text hook payloads.
//!
//! Recognizes literal marker *syntax* — it does not classify free text, and
//! is not the "signal-detection heuristics that classify free-text into
//! namespaces" the core spec leaves out of scope. This scanner only knows
//! `[remember]`/`[capture]`/`@memory`, their `:<namespace>` suffix, the
//! `[global]`/`[user]`/`[project]`/`[local]` domain selectors, and the
//! `▶ <namespace> ───` block syntax.

use cairn_core::model::Domain;
use once_cell::sync::Lazy;
use regex::Regex;

/// Default namespace when a marker carries no explicit `:<namespace>` suffix.
pub const DEFAULT_NAMESPACE: &str = "learnings";

/// One recognized capture instruction extracted from a text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedMarker {
    pub namespace: String,
    pub domain: Domain,
    pub content: String,
    /// Block-syntax markers are treated as high-confidence auto-capture
    /// (spec: "high-confidence detection (>0.99) for auto-capture").
    pub high_confidence: bool,
}

static INLINE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\[(remember|capture)(?::([a-z][a-z0-9_-]*))?\]|@memory(?::([a-z][a-z0-9_-]*))?)").unwrap());

static DOMAIN_SELECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[(global|user|project|local)\]").unwrap());

static BLOCK_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^▶\s*([a-z][a-z0-9_-]*)\s*─+.*$").unwrap());

/// Scans `text` for every recognized marker, in the order they appear.
/// Inline markers capture the remainder of their line (after the marker and
/// any domain selector are stripped); block markers capture every line up to
/// the next block-open line or end of input.
pub fn scan(text: &str) -> Vec<DetectedMarker> {
    let mut markers = Vec::new();

    let block_starts: Vec<(usize, usize, &str)> = BLOCK_OPEN
        .captures_iter(text)
        .map(|c| {
            let m = c.get(0).unwrap();
            (m.start(), m.end(), c.get(1).unwrap().as_str())
        })
        .collect();

    for (i, &(start, end, namespace)) in block_starts.iter().enumerate() {
        let body_end = block_starts.get(i + 1).map(|(s, _, _)| *s).unwrap_or(text.len());
        let body = text[end..body_end].trim();
        if body.is_empty() {
            continue;
        }
        markers.push(DetectedMarker {
            namespace: namespace.to_lowercase(),
            domain: Domain::Project,
            content: body.to_string(),
            high_confidence: true,
        });
        let _ = start;
    }

    // Inline markers are scanned line-by-line, skipping any line consumed by
    // a block above (block bodies already produced their own marker).
    let block_ranges: Vec<(usize, usize)> = block_starts
        .iter()
        .enumerate()
        .map(|(i, (s, _, _))| (*s, block_starts.get(i + 1).map(|(s2, _, _)| *s2).unwrap_or(text.len())))
        .collect();

    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if block_ranges.iter().any(|(s, e)| line_start >= *s && line_start < *e) {
            continue;
        }
        let Some(m) = INLINE_MARKER.find(line) else { continue };
        let caps = INLINE_MARKER.captures(line).unwrap();
        let namespace = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let rest = &line[m.end()..];
        let domain = DOMAIN_SELECTOR
            .captures(rest)
            .map(|c| match c.get(1).unwrap().as_str().to_lowercase().as_str() {
                "global" | "user" => Domain::User,
                _ => Domain::Project,
            })
            .unwrap_or(Domain::Project);
        let content = DOMAIN_SELECTOR.replace(rest, "").trim().to_string();
        if content.is_empty() {
            continue;
        }
        markers.push(DetectedMarker { namespace, domain, content, high_confidence: false });
    }

    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_remember_uses_default_namespace() {
        let found = scan("[remember] use B-trees for this index");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].namespace, "learnings");
        assert_eq!(found[0].content, "use B-trees for this index");
    }

    #[test]
    fn explicit_namespace_suffix_is_recognized() {
        let found = scan("[capture:decisions] chose postgres over sqlite");
        assert_eq!(found[0].namespace, "decisions");
    }

    #[test]
    fn at_memory_shorthand_is_recognized() {
        let found = scan("@memory:blockers flaky CI test");
        assert_eq!(found[0].namespace, "blockers");
        assert_eq!(found[0].content, "flaky CI test");
    }

    #[test]
    fn global_selector_routes_to_user_domain() {
        let found = scan("[remember] [global] prefer tabs over spaces");
        assert_eq!(found[0].domain, Domain::User);
        assert_eq!(found[0].content, "prefer tabs over spaces");
    }

    #[test]
    fn local_selector_routes_to_project_domain() {
        let found = scan("[remember] [local] only matters here");
        assert_eq!(found[0].domain, Domain::Project);
    }

    #[test]
    fn block_syntax_is_high_confidence() {
        let text = "▶ progress ───────\nshipped the migration\nall tests green\n▶ decisions ───────\nuse postgres";
        let found = scan(text);
        assert_eq!(found.len(), 2);
        assert!(found[0].high_confidence);
        assert_eq!(found[0].namespace, "progress");
        assert!(found[0].content.contains("shipped the migration"));
        assert_eq!(found[1].namespace, "decisions");
        assert_eq!(found[1].content, "use postgres");
    }

    #[test]
    fn text_without_markers_yields_nothing() {
        assert!(scan("just a normal sentence with no markers").is_empty());
    }
}
