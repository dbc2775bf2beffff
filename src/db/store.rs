use async_trait::async_trait;
use thiserror::Error;

use crate::models::{LearningModule, Progress, RoomRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored value could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Durable records of rooms, modules and per-user progress.
///
/// Writes are last-write-wins per record; nothing here is transactional across
/// records, so callers that read-then-decide must serialize themselves.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError>;

    /// Persist the learning fields of an existing room.
    async fn update_room(&self, room: &RoomRecord) -> Result<(), StoreError>;

    async fn list_modules(&self) -> Result<Vec<LearningModule>, StoreError>;

    async fn find_module(&self, module_id: &str) -> Result<Option<LearningModule>, StoreError>;

    async fn upsert_module(&self, module: &LearningModule) -> Result<(), StoreError>;

    async fn find_progress(&self, room_id: &str, module_id: &str, user_id: &str) -> Result<Option<Progress>, StoreError>;

    /// Insert `progress` unless a record for its (room, module, user) exists;
    /// returns whichever record is stored afterwards.
    async fn create_progress_if_absent(&self, progress: Progress) -> Result<Progress, StoreError>;

    async fn list_progress(&self, room_id: &str, module_id: &str) -> Result<Vec<Progress>, StoreError>;

    async fn update_progress(&self, progress: &Progress) -> Result<(), StoreError>;

    /// Set every personal pointer of the room+module to `index`.
    async fn set_progress_index(&self, room_id: &str, module_id: &str, index: usize) -> Result<u64, StoreError>;
}
