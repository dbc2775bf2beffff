pub mod dbcoderoom;
pub mod memstore;
pub mod store;

pub use dbcoderoom::DbCoderoom;
pub use memstore::MemStore;
pub use store::{RecordStore, StoreError};
