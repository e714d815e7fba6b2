use serde::Serialize;

use crate::context::Context;
use crate::tool::ToolKind;

/// Everything the supervisor needs to launch one assistant run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationDescriptor {
    pub executable: String,
    pub argv: Vec<String>,
    /// The complete prompt, written to the child's stdin.
    pub payload: String,
}

impl InvocationDescriptor {
    /// Human-readable command line for the execution log. The payload is summarized, not quoted.
    pub fn display_command(&self) -> String {
        let mut line = self.executable.clone();
        for arg in &self.argv {
            line.push(' ');
            line.push_str(arg);
        }
        line.push_str(&format!(" < stdin ({} bytes)", self.payload.len()));
        line
    }
}

#[derive(Serialize)]
struct SelectionAnnotation<'a> {
    #[serde(rename = "selectedText")]
    selected_text: &'a str,
}

pub fn build(
    tool: ToolKind,
    executable: &str,
    expanded_prompt: &str,
    context: &Context,
) -> InvocationDescriptor {
    InvocationDescriptor {
        executable: executable.to_string(),
        argv: tool
            .capability_flags()
            .iter()
            .map(ToString::to_string)
            .collect(),
        payload: compose_payload(expanded_prompt, context),
    }
}

fn compose_payload(prompt: &str, context: &Context) -> String {
    let mut payload = prompt.to_string();
    if let Some(document) = &context.document {
        payload.push_str(" @");
        payload.push_str(&document.path);
    }
    if let Some(selected_text) = context.selected_text.as_deref().filter(|s| !s.is_empty()) {
        let annotation = SelectionAnnotation { selected_text };
        // A struct of one &str field always serializes.
        if let Ok(json) = serde_json::to_string(&annotation) {
            payload.push_str(" Context: ");
            payload.push_str(&json);
        }
    }
    payload
}

#[cfg(test)]
#[path = "../tests/unit/command_tests.rs"]
mod tests;
