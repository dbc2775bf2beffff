use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::store::{RecordStore, StoreError};
use crate::models::{LearningModule, Progress, RoomRecord};

type ProgressKey = (String, String, String);

#[derive(Default)]
struct Records {
    rooms: HashMap<String, RoomRecord>,
    modules: BTreeMap<String, LearningModule>,
    progress: BTreeMap<ProgressKey, Progress>,
}

/// Process-local record store for tests and database-less development.
#[derive(Default)]
pub struct MemStore {
    records: Mutex<Records>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rooms are created by the HTTP layer elsewhere; this stands in for it.
    pub fn insert_room(&self, room: RoomRecord) {
        self.records().rooms.insert(room.room_id.clone(), room);
    }
}

fn key(room_id: &str, module_id: &str, user_id: &str) -> ProgressKey {
    (room_id.to_string(), module_id.to_string(), user_id.to_string())
}

#[async_trait]
impl RecordStore for MemStore {
    async fn find_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.records().rooms.get(room_id).cloned())
    }

    async fn update_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
        let mut records = self.records();
        match records.rooms.get_mut(&room.room_id) {
            Some(stored) => {
                *stored = room.clone();
                Ok(())
            }
            None => Err(StoreError::Other(format!("room {} does not exist", room.room_id))),
        }
    }

    async fn list_modules(&self) -> Result<Vec<LearningModule>, StoreError> {
        Ok(self.records().modules.values().cloned().collect())
    }

    async fn find_module(&self, module_id: &str) -> Result<Option<LearningModule>, StoreError> {
        Ok(self.records().modules.get(module_id).cloned())
    }

    async fn upsert_module(&self, module: &LearningModule) -> Result<(), StoreError> {
        self.records().modules.insert(module.module_id.clone(), module.clone());
        Ok(())
    }

    async fn find_progress(&self, room_id: &str, module_id: &str, user_id: &str) -> Result<Option<Progress>, StoreError> {
        Ok(self.records().progress.get(&key(room_id, module_id, user_id)).cloned())
    }

    async fn create_progress_if_absent(&self, progress: Progress) -> Result<Progress, StoreError> {
        let k = key(&progress.room_id, &progress.module_id, &progress.user_id);
        Ok(self.records().progress.entry(k).or_insert(progress).clone())
    }

    async fn list_progress(&self, room_id: &str, module_id: &str) -> Result<Vec<Progress>, StoreError> {
        Ok(self
            .records()
            .progress
            .values()
            .filter(|p| p.room_id == room_id && p.module_id == module_id)
            .cloned()
            .collect())
    }

    async fn update_progress(&self, progress: &Progress) -> Result<(), StoreError> {
        let k = key(&progress.room_id, &progress.module_id, &progress.user_id);
        self.records().progress.insert(k, progress.clone());
        Ok(())
    }

    async fn set_progress_index(&self, room_id: &str, module_id: &str, index: usize) -> Result<u64, StoreError> {
        let mut updated = 0;
        for p in self.records().progress.values_mut() {
            if p.room_id == room_id && p.module_id == module_id {
                p.current_checkpoint_index = index;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AiMode, Checkpoint, CheckpointType, Difficulty};

    fn module() -> LearningModule {
        LearningModule {
            module_id: "loops-beginners".into(),
            title: "Loops".into(),
            language: "python".into(),
            difficulty: Difficulty::Beginner,
            estimated_time_minutes: 20,
            checkpoints: vec![Checkpoint {
                checkpoint_id: "cp-1".into(),
                title: "Predict".into(),
                checkpoint_type: CheckpointType::PredictOutput,
                summary: String::new(),
                description: String::new(),
                starter_code: None,
                read_only_code: false,
                expected_output: None,
                require_peer_review: false,
                ai_mode: AiMode::Hint,
            }],
        }
    }

    #[tokio::test]
    async fn create_progress_if_absent_keeps_existing_record() {
        let store = MemStore::new();
        let module = module();

        let mut first = Progress::seeded("482913", &module, "a", 0);
        first.checkpoint_mut("cp-1").explanation_text = Some("mine".into());
        store.create_progress_if_absent(first.clone()).await.unwrap();

        let second = store
            .create_progress_if_absent(Progress::seeded("482913", &module, "a", 0))
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(store.list_progress("482913", "loops-beginners").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_progress_index_touches_only_the_room_module() {
        let store = MemStore::new();
        let module = module();
        for (room, user) in [("482913", "a"), ("482913", "b"), ("111111", "c")] {
            store.create_progress_if_absent(Progress::seeded(room, &module, user, 0)).await.unwrap();
        }

        assert_eq!(store.set_progress_index("482913", "loops-beginners", 1).await.unwrap(), 2);
        let other = store.find_progress("111111", "loops-beginners", "c").await.unwrap().unwrap();
        assert_eq!(other.current_checkpoint_index, 0);
    }

    #[tokio::test]
    async fn update_room_requires_existing_room() {
        let store = MemStore::new();
        let room = RoomRecord {
            room_id: "482913".into(),
            owner_id: "a".into(),
            is_learning_room: false,
            module_id: None,
            current_checkpoint_index: 0,
        };
        assert!(store.update_room(&room).await.is_err());

        store.insert_room(room.clone());
        let moved = RoomRecord { current_checkpoint_index: 2, ..room };
        store.update_room(&moved).await.unwrap();
        assert_eq!(store.find_room("482913").await.unwrap(), Some(moved));
    }
}
