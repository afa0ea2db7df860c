use std::{cell::RefCell, rc::Rc};

/// Value the registry writes to the editable attribute of a marked node.
pub const EDITABLE: &str = "true";

/// A rendered text node the registry can toggle and read back.
pub trait NodeHandle {
    /// Still attached to the page.
    fn is_connected(&self) -> bool;
    /// Has a non-zero rendered size and is not hidden.
    fn is_visible(&self) -> bool;
    fn editable_attr(&self) -> Option<String>;
    fn set_editable_attr(&self, value: Option<String>);
    fn text(&self) -> String;
    fn set_text(&self, text: &str);
}

#[derive(Debug)]
struct NodeState {
    text: String,
    editable: Option<String>,
    connected: bool,
    visible: bool,
}

/// Headless node used by the command-line editor and in tests. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryNode {
    state: Rc<RefCell<NodeState>>,
}

impl MemoryNode {
    pub fn new(text: &str) -> Self {
        Self {
            state: Rc::new(RefCell::new(NodeState {
                text: text.to_string(),
                editable: None,
                connected: true,
                visible: true,
            })),
        }
    }

    pub fn with_editable_attr(self, value: &str) -> Self {
        self.state.borrow_mut().editable = Some(value.to_string());
        self
    }

    pub fn set_visible(&self, visible: bool) {
        self.state.borrow_mut().visible = visible;
    }

    pub fn detach(&self) {
        self.state.borrow_mut().connected = false;
    }

    pub fn is_editable(&self) -> bool {
        self.state.borrow().editable.as_deref() == Some(EDITABLE)
    }

    /// Simulates the user typing into the node. Ignored unless the node is editable.
    pub fn type_text(&self, text: &str) -> bool {
        if !self.is_editable() {
            return false;
        }
        self.state.borrow_mut().text = text.to_string();
        true
    }
}

impl NodeHandle for MemoryNode {
    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    fn editable_attr(&self) -> Option<String> {
        self.state.borrow().editable.clone()
    }

    fn set_editable_attr(&self, value: Option<String>) {
        self.state.borrow_mut().editable = value;
    }

    fn text(&self) -> String {
        self.state.borrow().text.clone()
    }

    fn set_text(&self, text: &str) {
        self.state.borrow_mut().text = text.to_string();
    }
}
