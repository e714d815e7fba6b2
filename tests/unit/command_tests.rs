use super::*;
use crate::context::DocumentRef;

fn context(document: Option<&str>, selection: Option<&str>) -> Context {
    Context {
        document: document.map(DocumentRef::new),
        selected_text: selection.map(ToString::to_string),
    }
}

#[test]
fn bare_prompt_is_sent_unchanged() {
    let descriptor = build(ToolKind::Claude, "claude", "Fix grammar", &Context::default());
    assert_eq!(descriptor.payload, "Fix grammar");
}

#[test]
fn document_and_selection_are_appended_with_single_spaces() {
    let descriptor = build(
        ToolKind::Gemini,
        "gemini",
        "Summarize",
        &context(Some("notes/a.md"), Some("hello")),
    );
    assert_eq!(
        descriptor.payload,
        r#"Summarize @notes/a.md Context: {"selectedText":"hello"}"#
    );
}

#[test]
fn selection_without_document_skips_reference() {
    let descriptor = build(
        ToolKind::Claude,
        "claude",
        "Explain",
        &context(None, Some("x")),
    );
    assert_eq!(descriptor.payload, r#"Explain Context: {"selectedText":"x"}"#);
}

#[test]
fn selection_is_escaped_as_valid_json() {
    let selection = "say \"hi\"\n\ttab \\ back \u{1}";
    let descriptor = build(
        ToolKind::Claude,
        "claude",
        "Q",
        &context(None, Some(selection)),
    );
    let json = descriptor
        .payload
        .strip_prefix("Q Context: ")
        .expect("annotation prefix");
    assert!(!json.contains('\n'));
    let parsed: serde_json::Value = serde_json::from_str(json).expect("annotation is JSON");
    assert_eq!(parsed["selectedText"], selection);
    assert_eq!(parsed.as_object().map(|o| o.len()), Some(1));
}

#[test]
fn empty_selection_adds_no_annotation() {
    let descriptor = build(
        ToolKind::Claude,
        "claude",
        "Q",
        &context(Some("a.md"), Some("")),
    );
    assert_eq!(descriptor.payload, "Q @a.md");
}

#[test]
fn argv_holds_only_capability_flags() {
    let prompt = r#"He said "don't" and left; rm -rf /"#;
    let descriptor = build(
        ToolKind::Claude,
        "/opt/bin/claude",
        prompt,
        &context(Some("a.md"), Some("sel")),
    );
    assert_eq!(descriptor.executable, "/opt/bin/claude");
    assert_eq!(descriptor.argv, ToolKind::Claude.capability_flags());
    assert!(descriptor.argv.iter().all(|arg| !arg.contains("don't")));
    assert!(descriptor.payload.starts_with(prompt));

    let gemini = build(ToolKind::Gemini, "gemini", prompt, &Context::default());
    assert_eq!(gemini.argv, vec!["--yolo".to_string()]);
    assert_eq!(gemini.payload, prompt);
}

#[test]
fn display_command_summarizes_payload() {
    let descriptor = build(ToolKind::Gemini, "gemini", "hello", &Context::default());
    assert_eq!(descriptor.display_command(), "gemini --yolo < stdin (5 bytes)");
}
