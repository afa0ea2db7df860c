use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    rc::Rc,
    sync::Arc,
};

use super::{
    gateway::{ContentGateway, GatewayError},
    node::{NodeHandle, EDITABLE},
};
use crate::models::{normalize_path, ContentUpdate};

pub const ESCAPE_KEY: &str = "Escape";

/// Identity of an editable field: page path plus field key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    pub path: String,
    pub key: String,
}

impl FieldId {
    pub fn new(path: &str, key: &str) -> Self {
        Self {
            path: normalize_path(path),
            key: key.to_string(),
        }
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.path, self.key)
    }
}

/// Callback that pushes a persisted value into the component owning the field.
pub type ValueSetter = Box<dyn FnMut(&str)>;

/// What the node looked like before the registry marked it.
struct Marked {
    attr: Option<String>,
    text: String,
}

struct FieldEntry {
    node: Rc<dyn NodeHandle>,
    set_value: ValueSetter,
    marked: Option<Marked>,
}

impl FieldEntry {
    fn mark(&mut self) {
        if self.marked.is_some() || !self.node.is_connected() || !self.node.is_visible() {
            return;
        }
        self.marked = Some(Marked {
            attr: self.node.editable_attr(),
            text: self.node.text(),
        });
        self.node.set_editable_attr(Some(EDITABLE.to_string()));
    }

    /// Puts the attribute back. Returns the text seen when the node was marked.
    fn revert(&mut self) -> Option<String> {
        let marked = self.marked.take()?;
        self.node.set_editable_attr(marked.attr);
        Some(marked.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedField {
    pub id: FieldId,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(Vec<SavedField>),
    /// No mounted field had content to send. Edit mode was exited.
    NothingToSave,
    /// The save was rejected. Edit mode is kept so no edits are lost.
    Failed(String),
}

/// Tracks the mounted editable fields of a page session, toggles edit mode on
/// their nodes and saves every edited value in one batch.
///
/// Callers gate `enable_editing` on the session being a superadmin; the
/// registry does not check it again. The server refuses writes from anyone else.
pub struct EditorRegistry {
    gateway: Arc<dyn ContentGateway>,
    fields: BTreeMap<FieldId, FieldEntry>,
    cache: HashMap<FieldId, String>,
    pending: Vec<FieldId>,
    editing: bool,
}

impl EditorRegistry {
    pub fn new(gateway: Arc<dyn ContentGateway>) -> Self {
        Self {
            gateway,
            fields: BTreeMap::new(),
            cache: HashMap::new(),
            pending: Vec::new(),
            editing: false,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_registered(&self, id: &FieldId) -> bool {
        self.fields.contains_key(id)
    }

    pub fn field_ids(&self) -> impl Iterator<Item = &FieldId> {
        self.fields.keys()
    }

    pub fn cached(&self, id: &FieldId) -> Option<&str> {
        self.cache.get(id).map(String::as_str)
    }

    /// Adds or replaces a field. A field mounted during edit mode is marked on
    /// the next `flush_pending`.
    pub fn register_field(&mut self, id: FieldId, node: Rc<dyn NodeHandle>, set_value: ValueSetter) {
        let entry = FieldEntry {
            node,
            set_value,
            marked: None,
        };
        if let Some(mut previous) = self.fields.insert(id.clone(), entry) {
            previous.revert();
        }
        if self.editing && !self.pending.contains(&id) {
            self.pending.push(id);
        }
    }

    pub fn unregister_field(&mut self, id: &FieldId) -> bool {
        self.pending.retain(|pending| pending != id);
        match self.fields.remove(id) {
            Some(mut entry) => {
                entry.revert();
                true
            }
            None => false,
        }
    }

    /// Applies marks queued by fields registered while editing.
    pub fn flush_pending(&mut self) {
        for id in std::mem::take(&mut self.pending) {
            if !self.editing {
                break;
            }
            if let Some(entry) = self.fields.get_mut(&id) {
                entry.mark();
            }
        }
    }

    pub fn enable_editing(&mut self) {
        if self.editing {
            return;
        }
        self.editing = true;
        self.pending.clear();
        for entry in self.fields.values_mut() {
            entry.mark();
        }
        log::debug!("edit mode on for {} fields", self.fields.len());
    }

    /// Leaves edit mode. Every node is restored from the cache, or from the
    /// text it had when marked, so unsaved edits are discarded.
    pub fn disable_editing(&mut self) {
        if !self.editing {
            return;
        }
        self.editing = false;
        self.pending.clear();
        for (id, entry) in self.fields.iter_mut() {
            let snapshot = entry.revert();
            if let Some(text) = self.cache.get(id).cloned().or(snapshot) {
                entry.node.set_text(&text);
            }
        }
        log::debug!("edit mode off");
    }

    pub fn toggle_editing(&mut self) -> bool {
        if self.editing {
            self.disable_editing();
        } else {
            self.enable_editing();
        }
        self.editing
    }

    /// Returns true when the key was consumed.
    pub fn handle_key(&mut self, key: &str) -> bool {
        if key == ESCAPE_KEY && self.editing {
            self.disable_editing();
            return true;
        }
        false
    }

    /// Persisted value of a field, fetched once per page session.
    pub async fn load_field(&mut self, id: &FieldId) -> Result<Option<String>, GatewayError> {
        if let Some(content) = self.cache.get(id) {
            return Ok(Some(content.clone()));
        }
        let content = self.gateway.fetch_field(&id.path, &id.key).await?;
        if let Some(content) = &content {
            self.cache.insert(id.clone(), content.clone());
        }
        Ok(content)
    }

    /// Caches every persisted field of a page and returns them.
    pub async fn load_page(&mut self, path: &str) -> Result<Vec<(FieldId, String)>, GatewayError> {
        let entries = self.gateway.fetch_page(&normalize_path(path)).await?;
        let mut loaded = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = FieldId::new(path, &entry.key);
            self.cache.insert(id.clone(), entry.content.clone());
            loaded.push((id, entry.content));
        }
        Ok(loaded)
    }

    /// Sends the live text of every mounted field in one batch.
    pub async fn save(&mut self) -> SaveOutcome {
        let updates: Vec<ContentUpdate> = self
            .fields
            .iter()
            .filter(|(_, entry)| entry.node.is_connected())
            .map(|(id, entry)| ContentUpdate {
                path: id.path.clone(),
                key: id.key.clone(),
                content: entry.node.text(),
            })
            .collect();

        if updates.is_empty() {
            log::info!("nothing to save");
            self.disable_editing();
            return SaveOutcome::NothingToSave;
        }

        let saved = match self.gateway.save_contents(&updates).await {
            Ok(saved) => saved,
            Err(e) => {
                log::warn!("saving {} fields failed: {}", updates.len(), e);
                return SaveOutcome::Failed(e.user_message());
            }
        };

        let mut fields = Vec::with_capacity(saved.len());
        for row in saved {
            let id = FieldId::new(&row.path, &row.key);
            self.cache.insert(id.clone(), row.content.clone());
            if let Some(entry) = self.fields.get_mut(&id) {
                (entry.set_value)(&row.content);
                entry.node.set_text(&row.content);
            }
            fields.push(SavedField {
                id,
                content: row.content,
                updated_at: row.updated_at,
            });
        }

        self.disable_editing();
        SaveOutcome::Saved(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::node::MemoryNode;
    use crate::models::{ContentEntry, EditableContent};
    use async_trait::async_trait;
    use std::{cell::RefCell, sync::Mutex};

    #[derive(Default)]
    struct FakeGateway {
        stored: Mutex<HashMap<(String, String), String>>,
        batches: Mutex<Vec<Vec<ContentUpdate>>>,
        fetches: Mutex<usize>,
        reject_with: Mutex<Option<Option<String>>>,
    }

    impl FakeGateway {
        fn with(entries: &[(&str, &str, &str)]) -> Arc<Self> {
            let gateway = Self::default();
            {
                let mut stored = gateway.stored.lock().unwrap();
                for (path, key, content) in entries {
                    stored.insert((path.to_string(), key.to_string()), content.to_string());
                }
            }
            Arc::new(gateway)
        }

        fn reject(&self, message: Option<&str>) {
            *self.reject_with.lock().unwrap() = Some(message.map(str::to_string));
        }

        fn batch_count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ContentGateway for FakeGateway {
        async fn fetch_field(&self, path: &str, key: &str) -> Result<Option<String>, GatewayError> {
            *self.fetches.lock().unwrap() += 1;
            Ok(self
                .stored
                .lock()
                .unwrap()
                .get(&(path.to_string(), key.to_string()))
                .cloned())
        }

        async fn fetch_page(&self, path: &str) -> Result<Vec<ContentEntry>, GatewayError> {
            Ok(self
                .stored
                .lock()
                .unwrap()
                .iter()
                .filter(|((p, _), _)| p == path)
                .map(|((_, key), content)| ContentEntry {
                    key: key.clone(),
                    content: content.clone(),
                })
                .collect())
        }

        async fn save_contents(
            &self,
            updates: &[ContentUpdate],
        ) -> Result<Vec<EditableContent>, GatewayError> {
            self.batches.lock().unwrap().push(updates.to_vec());
            if let Some(message) = self.reject_with.lock().unwrap().clone() {
                return Err(GatewayError::Rejected { status: 403, message });
            }
            let mut stored = self.stored.lock().unwrap();
            Ok(updates
                .iter()
                .map(|u| {
                    stored.insert((u.path.clone(), u.key.clone()), u.content.clone());
                    EditableContent {
                        path: u.path.clone(),
                        key: u.key.clone(),
                        content: u.content.clone(),
                        updated_at: Utc::now(),
                    }
                })
                .collect())
        }
    }

    fn mount(
        registry: &mut EditorRegistry,
        path: &str,
        key: &str,
        text: &str,
    ) -> (FieldId, MemoryNode, Rc<RefCell<Vec<String>>>) {
        let id = FieldId::new(path, key);
        let node = MemoryNode::new(text);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        registry.register_field(
            id.clone(),
            Rc::new(node.clone()),
            Box::new(move |value: &str| sink.borrow_mut().push(value.to_string())),
        );
        (id, node, seen)
    }

    #[test]
    fn enable_marks_only_visible_nodes_and_disable_restores_attributes() {
        let mut registry = EditorRegistry::new(FakeGateway::with(&[]));
        let (_, shown, _) = mount(&mut registry, "/", "home.hero.title", "Viaje");
        let (_, hidden, _) = mount(&mut registry, "/", "home.hero.subtitle", "Pacotes");
        hidden.set_visible(false);
        let nested = MemoryNode::new("Contato").with_editable_attr("plaintext-only");
        registry.register_field(
            FieldId::new("/", "home.contact.title"),
            Rc::new(nested.clone()),
            Box::new(|_: &str| {}),
        );

        registry.enable_editing();
        assert!(registry.is_editing());
        assert!(shown.is_editable());
        assert!(!hidden.is_editable());
        assert!(nested.is_editable());

        assert!(!registry.toggle_editing());
        assert_eq!(shown.editable_attr(), None);
        assert_eq!(hidden.editable_attr(), None);
        assert_eq!(nested.editable_attr().as_deref(), Some("plaintext-only"));
    }

    #[test]
    fn fields_mounted_while_editing_wait_for_flush() {
        let mut registry = EditorRegistry::new(FakeGateway::with(&[]));
        registry.enable_editing();

        let (_, node, _) = mount(&mut registry, "/sobre", "about.hero.title", "Quem somos");
        assert!(!node.is_editable());

        registry.flush_pending();
        assert!(node.is_editable());
    }

    #[test]
    fn unregister_reverts_marked_node() {
        let mut registry = EditorRegistry::new(FakeGateway::with(&[]));
        let (id, node, _) = mount(&mut registry, "/", "home.hero.title", "Viaje");
        registry.enable_editing();
        assert!(node.is_editable());

        assert!(registry.unregister_field(&id));
        assert!(!node.is_editable());
        assert!(!registry.is_registered(&id));
        assert!(!registry.unregister_field(&id));
    }

    #[test]
    fn escape_discards_unsaved_edits() {
        let mut registry = EditorRegistry::new(FakeGateway::with(&[]));
        let (_, node, seen) = mount(&mut registry, "/", "home.hero.title", "Viaje");

        assert!(!registry.handle_key(ESCAPE_KEY));
        registry.enable_editing();
        node.type_text("Rascunho");
        assert!(!registry.handle_key("Enter"));
        assert!(registry.handle_key(ESCAPE_KEY));

        assert!(!registry.is_editing());
        assert_eq!(node.text(), "Viaje");
        assert!(seen.borrow().is_empty());
    }

    #[tokio::test]
    async fn save_without_fields_skips_request() {
        let gateway = FakeGateway::with(&[]);
        let mut registry = EditorRegistry::new(gateway.clone());
        registry.enable_editing();

        assert_eq!(registry.save().await, SaveOutcome::NothingToSave);
        assert!(!registry.is_editing());
        assert_eq!(gateway.batch_count(), 0);

        let (_, node, _) = mount(&mut registry, "/", "home.hero.title", "Viaje");
        node.detach();
        assert_eq!(registry.save().await, SaveOutcome::NothingToSave);
        assert_eq!(gateway.batch_count(), 0);
    }

    #[tokio::test]
    async fn save_sends_live_text_in_one_batch() {
        let gateway = FakeGateway::with(&[]);
        let mut registry = EditorRegistry::new(gateway.clone());
        let (title, title_node, title_seen) = mount(&mut registry, "/", "home.hero.title", "Viaje");
        let (_, subtitle_node, _) = mount(&mut registry, "/", "home.hero.subtitle", "Pacotes");
        let (_, gone, _) = mount(&mut registry, "/sobre", "about.hero.title", "Sobre");
        gone.detach();

        registry.enable_editing();
        title_node.type_text("Partiu Nordeste");

        let fields = match registry.save().await {
            SaveOutcome::Saved(fields) => fields,
            other => panic!("expected a successful save, got {:?}", other),
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(gateway.batch_count(), 1);

        let batch = gateway.batches.lock().unwrap()[0].clone();
        assert_eq!(
            batch.iter().map(|u| u.content.as_str()).collect::<Vec<_>>(),
            vec!["Pacotes", "Partiu Nordeste"]
        );

        assert!(!registry.is_editing());
        assert!(!title_node.is_editable());
        assert_eq!(title_node.text(), "Partiu Nordeste");
        assert_eq!(subtitle_node.text(), "Pacotes");
        assert_eq!(*title_seen.borrow(), vec!["Partiu Nordeste".to_string()]);
        assert_eq!(registry.cached(&title), Some("Partiu Nordeste"));
    }

    #[tokio::test]
    async fn failed_save_keeps_edit_mode_and_edits() {
        let gateway = FakeGateway::with(&[]);
        gateway.reject(Some("Forbidden"));
        let mut registry = EditorRegistry::new(gateway.clone());
        let (id, node, seen) = mount(&mut registry, "/", "home.hero.title", "Viaje");

        registry.enable_editing();
        node.type_text("Nova chamada");

        assert_eq!(registry.save().await, SaveOutcome::Failed("Forbidden".to_string()));
        assert!(registry.is_editing());
        assert!(node.is_editable());
        assert_eq!(node.text(), "Nova chamada");
        assert!(seen.borrow().is_empty());
        assert_eq!(registry.cached(&id), None);

        gateway.reject(None);
        assert_eq!(
            registry.save().await,
            SaveOutcome::Failed(crate::editor::gateway::GENERIC_SAVE_ERROR.to_string())
        );
    }

    #[tokio::test]
    async fn loaded_fields_come_from_cache_afterwards() {
        let gateway = FakeGateway::with(&[("/", "home.hero.title", "Viaje")]);
        let mut registry = EditorRegistry::new(gateway.clone());
        let id = FieldId::new("", "home.hero.title");

        assert_eq!(registry.load_field(&id).await.unwrap().as_deref(), Some("Viaje"));
        assert_eq!(registry.load_field(&id).await.unwrap().as_deref(), Some("Viaje"));
        assert_eq!(*gateway.fetches.lock().unwrap(), 1);

        let missing = FieldId::new("/", "home.missing");
        assert_eq!(registry.load_field(&missing).await.unwrap(), None);
        assert_eq!(registry.cached(&missing), None);
    }

    #[tokio::test]
    async fn disable_after_page_load_restores_cached_copy() {
        let gateway = FakeGateway::with(&[("/sobre", "about.hero.title", "Quem somos")]);
        let mut registry = EditorRegistry::new(gateway);
        let loaded = registry.load_page("sobre").await.unwrap();
        assert_eq!(loaded.len(), 1);

        let (_, node, _) = mount(&mut registry, "/sobre", "about.hero.title", "placeholder");
        registry.enable_editing();
        node.type_text("Rascunho");
        registry.disable_editing();

        assert_eq!(node.text(), "Quem somos");
    }
}
