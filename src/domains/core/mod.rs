pub mod object_store;

pub use object_store::{ApiObjectStore, LocalObjectStore, ObjectStore, ObjectStoreError, ObjectStoreResult};
