use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::vault::DocumentStore;

/// Extensions that make an `@` token a document reference.
pub const DOCUMENT_EXTENSIONS: [&str; 2] = ["md", "markdown"];

static REFERENCE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\S+)").expect("reference token pattern is valid"));

/// Punctuation that may follow a reference without being part of its path.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '"', '\''];

/// A document reference found in a prompt: the byte range it occupies and its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reference<'a> {
    start: usize,
    end: usize,
    path: &'a str,
}

/// Inlines every `@path.md` token of `raw` with the referenced document.
///
/// Tokens are replaced left to right at the positions they occupy in `raw`, so text pulled in
/// from one document is never scanned for further references. Each distinct path is looked up
/// once. Lookup and read failures become inline markers; expansion itself never fails.
pub fn expand(raw: &str, store: &dyn DocumentStore) -> String {
    if !has_document_references(raw) {
        return raw.to_string();
    }
    let mut replacements: HashMap<&str, String> = HashMap::new();
    let mut expanded = String::with_capacity(raw.len());
    let mut cursor = 0;

    for reference in references(raw) {
        let replacement = replacements
            .entry(reference.path)
            .or_insert_with(|| render_reference(reference.path, store));
        expanded.push_str(&raw[cursor..reference.start]);
        expanded.push_str(replacement);
        cursor = reference.end;
    }

    expanded.push_str(&raw[cursor..]);
    expanded
}

pub fn has_document_references(raw: &str) -> bool {
    references(raw).next().is_some()
}

/// Whitespace-delimited `@` tokens whose path, after trailing punctuation is set aside, ends in
/// a document extension. `@draft.mdx` and `@notes.md.bak` are not references.
fn references(raw: &str) -> impl Iterator<Item = Reference<'_>> {
    REFERENCE_TOKEN.captures_iter(raw).filter_map(move |captures| {
        let token = captures.get(0)?;
        let candidate = captures.get(1)?.as_str();
        if !starts_token(raw, token.start()) {
            return None;
        }
        let path = candidate.trim_end_matches(TRAILING_PUNCTUATION);
        is_document_path(path).then_some(Reference {
            start: token.start(),
            end: token.start() + 1 + path.len(),
            path,
        })
    })
}

fn is_document_path(path: &str) -> bool {
    path.rsplit_once('.').is_some_and(|(stem, extension)| {
        !stem.is_empty() && !stem.ends_with('/') && DOCUMENT_EXTENSIONS.contains(&extension)
    })
}

fn starts_token(text: &str, at: usize) -> bool {
    text[..at]
        .chars()
        .next_back()
        .is_none_or(char::is_whitespace)
}

fn render_reference(path: &str, store: &dyn DocumentStore) -> String {
    let Some(handle) = store.lookup_document(path) else {
        tracing::warn!(path, "referenced document not found");
        return format!("[File not found: {path}]");
    };
    match store.read_document(&handle) {
        Ok(content) => {
            tracing::debug!(path, bytes = content.len(), "inlined referenced document");
            format!("File: {path}\nContent:\n{content}\n")
        }
        Err(err) => {
            tracing::warn!(path, error = %err, "failed to read referenced document");
            format!("[Error reading file: {path}]")
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/expand_tests.rs"]
mod tests;
