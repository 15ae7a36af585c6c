pub mod file_container;
pub mod file_store;
mod journal;

pub use file_container::FileContainer;
pub use file_store::{FileDocumentStore, StoreOptions};
