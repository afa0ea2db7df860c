//! Headless in-place editor for page copy.
//!
//! `EditorRegistry` owns the mounted fields of one page session. Nodes are
//! reached through `NodeHandle` and persistence goes through `ContentGateway`.

pub mod gateway;
pub mod node;
pub mod registry;

pub use gateway::{ContentGateway, GatewayError, HttpContentGateway};
pub use node::{MemoryNode, NodeHandle};
pub use registry::{EditorRegistry, FieldId, SaveOutcome, SavedField, ValueSetter};
