// Module declarations
pub mod persistence;
pub mod search;

// Re-export all implementations
pub use persistence::{FileContainer, FileDocumentStore, StoreOptions};
pub use search::attribute_index::AttributeIndex;
