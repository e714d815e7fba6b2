/// Vault-relative reference to the document the user is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub path: String,
}

impl DocumentRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// What the host editor exposes about the user's current focus.
pub trait EditorHost {
    fn active_document(&self) -> Option<DocumentRef>;

    /// Selected text, or an empty string when nothing is selected.
    fn selection(&self) -> String;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub document: Option<DocumentRef>,
    pub selected_text: Option<String>,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.document.is_none() && self.selected_text.is_none()
    }
}

/// Reads the host's focus into a fresh [`Context`]. Never fails and never caches.
pub fn resolve(host: &dyn EditorHost) -> Context {
    let selection = host.selection();
    Context {
        document: host.active_document(),
        selected_text: (!selection.is_empty()).then_some(selection),
    }
}

/// Host with a focus fixed at construction, used by the headless `run` command.
#[derive(Debug, Clone, Default)]
pub struct FixedHost {
    pub document: Option<DocumentRef>,
    pub selection: String,
}

impl EditorHost for FixedHost {
    fn active_document(&self) -> Option<DocumentRef> {
        self.document.clone()
    }

    fn selection(&self) -> String {
        self.selection.clone()
    }
}
