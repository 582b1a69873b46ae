//! The session-start injection envelope (spec §6, normative structure).

use cairn_core::recall::{ContextDocument, ContextElement};
use serde::Serialize;

/// Renders a [`ContextDocument`] into the `<memory_consolidated_summaries>`
/// tag the hook transport embeds in `additionalContext`. The tag name is
/// fixed so the host process can find-and-replace a prior injection of the
/// same tag rather than accumulate one per turn.
pub fn render_context_document(doc: &ContextDocument) -> String {
    let mut body = String::new();
    render_section(&mut body, "working_memory", &doc.working_memory);
    render_section(&mut body, "semantic_context", &doc.semantic_context);

    format!(
        "<memory_consolidated_summaries version=\"{}\" generated_at=\"{}\">\n{}</memory_consolidated_summaries>",
        doc.version,
        doc.generated_at.to_rfc3339(),
        body,
    )
}

fn render_section(out: &mut String, tag: &str, elements: &[ContextElement]) {
    if elements.is_empty() {
        return;
    }
    out.push_str(&format!("<{tag}>\n"));
    for element in elements {
        match element {
            ContextElement::Memory { id, namespace, summary } => {
                out.push_str(&format!("- [{namespace}] {summary} ({id})\n"));
            }
            ContextElement::Unavailable { id } => {
                out.push_str(&format!("- <unavailable: {id}>\n"));
            }
        }
    }
    out.push_str(&format!("</{tag}>\n"));
}

/// The `hookSpecificOutput` wrapper spec §6 requires on stdout for
/// `SessionStart`.
#[derive(Debug, Serialize)]
pub struct SessionStartOutput {
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Serialize)]
pub struct HookSpecificOutput {
    #[serde(rename = "hookEventName")]
    pub hook_event_name: &'static str,
    #[serde(rename = "additionalContext")]
    pub additional_context: String,
}

impl SessionStartOutput {
    pub fn new(doc: &ContextDocument) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: "SessionStart",
                additional_context: render_context_document(doc),
            },
        }
    }
}
