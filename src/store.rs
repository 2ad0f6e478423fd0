//! The versioned tree store and its read-only query layers.

mod inheritance;
mod module_store;
mod publish_state;

pub use inheritance::INHERITABLE_KEYS;
pub use module_store::{ModuleStore, RevisionOption, StoreError};
pub use publish_state::PublishState;
