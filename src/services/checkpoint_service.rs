use moka::future::Cache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::db::{RecordStore, StoreError};
use crate::models::{
    Checkpoint, CheckpointStatus, CheckpointType, ExplanationResponse, LearningModule, LearningStateResponse,
    Progress, RoomRecord,
};
use crate::services::tutor_service::TutorService;

/// Completed records a peer-reviewed checkpoint needs before the room moves on.
pub const REQUIRED_PEER_COMPLETIONS: usize = 2;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    RejectedPrecondition(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("record store failure: {0}")]
    Store(#[from] StoreError),
}

type RoomLock = Arc<Mutex<()>>;

/// Learning rooms: the shared checkpoint pointer and per-user progress.
///
/// Every read-decide-write sequence on a room runs under that room's async
/// lock, so racing `next` calls are evaluated one after the other against the
/// pointer as it stands at their turn.
pub struct CheckpointService {
    store: Arc<dyn RecordStore>,
    tutor: Arc<TutorService>,
    modules: Cache<String, Arc<LearningModule>>,
    /// Live room locks. An entry stays reachable for as long as anyone holds
    /// or waits on it; dead entries are pruned on insert.
    room_locks: StdMutex<HashMap<String, Weak<Mutex<()>>>>,
}

/// Room bound to a module, loaded together.
struct LearningRoom {
    room: RoomRecord,
    module: Arc<LearningModule>,
}

impl LearningRoom {
    fn module_id(&self) -> &str {
        &self.module.module_id
    }
}

impl CheckpointService {
    pub fn new(store: Arc<dyn RecordStore>, tutor: Arc<TutorService>) -> Self {
        Self {
            store,
            tutor,
            modules: Cache::builder()
                .max_capacity(10_000)
                .time_to_idle(Duration::from_secs(30 * 60))
                .build(),
            room_locks: StdMutex::new(HashMap::new()),
        }
    }

    fn room_lock(&self, room_id: &str) -> RoomLock {
        let mut locks = self.room_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(room_id).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(room_id.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Published modules are immutable, so a cached copy never goes stale.
    async fn module(&self, module_id: &str) -> Result<Arc<LearningModule>, LearningError> {
        if let Some(module) = self.modules.get(module_id).await {
            return Ok(module);
        }
        let module = self
            .store
            .find_module(module_id)
            .await?
            .ok_or_else(|| LearningError::NotFound(format!("Module {} not found", module_id)))?;
        let module = Arc::new(module);
        self.modules.insert(module_id.to_string(), module.clone()).await;
        Ok(module)
    }

    async fn room(&self, room_id: &str) -> Result<RoomRecord, LearningError> {
        self.store
            .find_room(room_id)
            .await?
            .ok_or_else(|| LearningError::NotFound(format!("Room {} not found", room_id)))
    }

    async fn learning_room(&self, room_id: &str) -> Result<LearningRoom, LearningError> {
        let room = self.room(room_id).await?;
        let module_id = match (&room.module_id, room.is_learning_room) {
            (Some(module_id), true) => module_id.clone(),
            _ => return Err(LearningError::NotFound(format!("Room {} is not a learning room", room_id))),
        };
        let module = self.module(&module_id).await?;
        Ok(LearningRoom { room, module })
    }

    fn checkpoint<'a>(lr: &'a LearningRoom, checkpoint_id: &str) -> Result<&'a Checkpoint, LearningError> {
        lr.module
            .checkpoint(checkpoint_id)
            .ok_or_else(|| LearningError::NotFound(format!("Checkpoint {} not found", checkpoint_id)))
    }

    /// The caller's progress record, created on first sight.
    async fn progress_for(&self, lr: &LearningRoom, user_id: &str) -> Result<Progress, LearningError> {
        if let Some(progress) = self.store.find_progress(&lr.room.room_id, lr.module_id(), user_id).await? {
            return Ok(progress);
        }
        let seeded = Progress::seeded(&lr.room.room_id, &lr.module, user_id, lr.room.current_checkpoint_index);
        info!("Creating progress for user {} in room {} ({})", user_id, lr.room.room_id, lr.module_id());
        Ok(self.store.create_progress_if_absent(seeded).await?)
    }

    pub async fn list_modules(&self) -> Result<Vec<LearningModule>, LearningError> {
        Ok(self.store.list_modules().await?)
    }

    /// Store a module definition, replacing any previous one with the same id.
    pub async fn publish_module(&self, module: LearningModule) -> Result<(), LearningError> {
        self.store.upsert_module(&module).await?;
        self.modules.insert(module.module_id.clone(), Arc::new(module)).await;
        Ok(())
    }

    /// Bind an existing room to a module. Switching modules resets the room
    /// pointer; re-binding the same module keeps it.
    pub async fn start_module(&self, room_id: &str, module_id: &str, user_id: &str) -> Result<LearningStateResponse, LearningError> {
        let module = self.module(module_id).await?;
        if module.checkpoints.is_empty() {
            return Err(LearningError::InvalidRequest(format!("Module {} has no checkpoints", module_id)));
        }

        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let mut room = self.room(room_id).await?;
        if room.module_id.as_deref() != Some(module_id) {
            room.current_checkpoint_index = 0;
        }
        room.is_learning_room = true;
        room.module_id = Some(module_id.to_string());
        self.store.update_room(&room).await?;
        info!("Room {} bound to module {} by user {}", room_id, module_id, user_id);

        let lr = LearningRoom { room, module };
        let progress = self.progress_for(&lr, user_id).await?;
        Ok(LearningStateResponse {
            room: lr.room,
            module: lr.module.as_ref().clone(),
            progress,
        })
    }

    pub async fn state(&self, room_id: &str, user_id: &str) -> Result<LearningStateResponse, LearningError> {
        let lr = self.learning_room(room_id).await?;
        let progress = self.progress_for(&lr, user_id).await?;
        Ok(LearningStateResponse {
            room: lr.room,
            module: lr.module.as_ref().clone(),
            progress,
        })
    }

    /// Mark the caller's own checkpoint completed. Never moves the room.
    pub async fn complete(&self, room_id: &str, checkpoint_id: &str, user_id: &str) -> Result<Progress, LearningError> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let lr = self.learning_room(room_id).await?;
        Self::checkpoint(&lr, checkpoint_id)?;
        let mut progress = self.progress_for(&lr, user_id).await?;
        progress.checkpoint_mut(checkpoint_id).status = CheckpointStatus::Completed;
        self.store.update_progress(&progress).await?;
        info!("User {} completed checkpoint {} in room {}", user_id, checkpoint_id, room_id);
        Ok(progress)
    }

    /// Have the tutor review an explanation; its verdict is the only way an
    /// explain-to-unlock checkpoint gets accepted.
    pub async fn submit_explanation(
        &self,
        room_id: &str,
        checkpoint_id: &str,
        user_id: &str,
        explanation: &str,
    ) -> Result<ExplanationResponse, LearningError> {
        let explanation = explanation.trim();
        if explanation.is_empty() {
            return Err(LearningError::InvalidRequest("Explanation must not be empty".to_string()));
        }

        let lr = self.learning_room(room_id).await?;
        let checkpoint = Self::checkpoint(&lr, checkpoint_id)?;
        if checkpoint.checkpoint_type != CheckpointType::ExplainToUnlock {
            return Err(LearningError::InvalidRequest(format!(
                "Checkpoint {} is not an explain-to-unlock checkpoint",
                checkpoint_id
            )));
        }

        // The tutor call can be slow; only the write below holds the room.
        let (accepted, feedback) = self
            .tutor
            .review_explanation(&lr.module.language, checkpoint, explanation)
            .await;

        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let mut progress = self.progress_for(&lr, user_id).await?;
        let entry = progress.checkpoint_mut(checkpoint_id);
        entry.explanation_text = Some(explanation.to_string());
        entry.explanation_accepted = accepted;
        entry.status = if accepted { CheckpointStatus::Completed } else { CheckpointStatus::InProgress };
        self.store.update_progress(&progress).await?;

        info!(
            "Explanation of user {} for checkpoint {} in room {} {}",
            user_id,
            checkpoint_id,
            room_id,
            if accepted { "accepted" } else { "rejected" }
        );
        Ok(ExplanationResponse { accepted, feedback, progress })
    }

    pub async fn reflect(&self, room_id: &str, checkpoint_id: &str, user_id: &str, reflection: &str) -> Result<Progress, LearningError> {
        if reflection.trim().is_empty() {
            return Err(LearningError::InvalidRequest("Reflection must not be empty".to_string()));
        }

        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let lr = self.learning_room(room_id).await?;
        Self::checkpoint(&lr, checkpoint_id)?;
        let mut progress = self.progress_for(&lr, user_id).await?;
        progress.checkpoint_mut(checkpoint_id).reflection_text = Some(reflection.to_string());
        self.store.update_progress(&progress).await?;
        debug!("Stored reflection of user {} for checkpoint {}", user_id, checkpoint_id);
        Ok(progress)
    }

    fn check_from_index(room: &RoomRecord, from_index: Option<usize>) -> Result<(), LearningError> {
        match from_index {
            Some(from) if from != room.current_checkpoint_index => {
                warn!(
                    "Room {} pointer is at {}, caller expected {}",
                    room.room_id, room.current_checkpoint_index, from
                );
                Err(LearningError::RejectedPrecondition("Checkpoint already moved".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Gates of the checkpoint the room pointer is on.
    async fn check_gates(&self, lr: &LearningRoom, checkpoint: &Checkpoint) -> Result<(), LearningError> {
        if checkpoint.checkpoint_type != CheckpointType::ExplainToUnlock && !checkpoint.require_peer_review {
            return Ok(());
        }

        let records = self.store.list_progress(&lr.room.room_id, lr.module_id()).await?;

        if checkpoint.checkpoint_type == CheckpointType::ExplainToUnlock
            && !records.iter().any(|p| p.has_accepted_explanation(&checkpoint.checkpoint_id))
        {
            return Err(LearningError::RejectedPrecondition(
                "Explanation not yet accepted for this checkpoint".to_string(),
            ));
        }

        if checkpoint.require_peer_review {
            let completions = records.iter().filter(|p| p.is_completed(&checkpoint.checkpoint_id)).count();
            if completions < REQUIRED_PEER_COMPLETIONS {
                return Err(LearningError::RejectedPrecondition(format!(
                    "Not enough peer completions for this checkpoint ({}/{})",
                    completions, REQUIRED_PEER_COMPLETIONS
                )));
            }
        }
        Ok(())
    }

    /// Move the room pointer and pull every member's personal pointer along.
    async fn move_pointer(&self, lr: &mut LearningRoom, user_id: &str, index: usize) -> Result<(), LearningError> {
        // The caller gets a record first so the pull reaches them too.
        self.progress_for(lr, user_id).await?;
        lr.room.current_checkpoint_index = index;
        self.store.update_room(&lr.room).await?;
        let pulled = self.store.set_progress_index(&lr.room.room_id, lr.module_id(), index).await?;
        info!(
            "Room {} pointer moved to {} by user {}, {} progress record(s) pulled",
            lr.room.room_id, index, user_id, pulled
        );
        Ok(())
    }

    /// Gated single-step advance of the room pointer.
    pub async fn next(&self, room_id: &str, user_id: &str, from_index: Option<usize>) -> Result<RoomRecord, LearningError> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let mut lr = self.learning_room(room_id).await?;
        Self::check_from_index(&lr.room, from_index)?;

        let index = lr.room.current_checkpoint_index;
        let last = lr.module.last_index();
        if index >= last {
            return Err(LearningError::RejectedPrecondition("Module already complete".to_string()));
        }
        let checkpoint = lr.module.checkpoints[index].clone();
        self.check_gates(&lr, &checkpoint).await?;

        self.move_pointer(&mut lr, user_id, (index + 1).min(last)).await?;
        Ok(lr.room)
    }

    /// Ungated single step back.
    pub async fn previous(&self, room_id: &str, user_id: &str, from_index: Option<usize>) -> Result<RoomRecord, LearningError> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let mut lr = self.learning_room(room_id).await?;
        Self::check_from_index(&lr.room, from_index)?;

        let index = lr.room.current_checkpoint_index;
        if index == 0 {
            return Err(LearningError::RejectedPrecondition("Already at the first checkpoint".to_string()));
        }
        let last = lr.module.last_index();
        self.move_pointer(&mut lr, user_id, (index - 1).min(last)).await?;
        Ok(lr.room)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clients::Tutor;
    use crate::db::MemStore;
    use crate::models::{AiMode, Difficulty};
    use crate::services::tutor_service::tests::ScriptedTutor;

    pub(crate) fn checkpoint(id: &str, checkpoint_type: CheckpointType, require_peer_review: bool) -> Checkpoint {
        Checkpoint {
            checkpoint_id: id.to_string(),
            title: format!("Checkpoint {}", id),
            checkpoint_type,
            summary: String::new(),
            description: format!("Do {}", id),
            starter_code: None,
            read_only_code: false,
            expected_output: None,
            require_peer_review,
            ai_mode: AiMode::Hint,
        }
    }

    /// cp-0 plain, cp-1 peer reviewed, cp-2 explain-to-unlock, cp-3 reflection.
    pub(crate) fn loops_module() -> LearningModule {
        LearningModule {
            module_id: "loops-beginners".into(),
            title: "Loops for beginners".into(),
            language: "python".into(),
            difficulty: Difficulty::Beginner,
            estimated_time_minutes: 30,
            checkpoints: vec![
                checkpoint("cp-0", CheckpointType::PredictOutput, false),
                checkpoint("cp-1", CheckpointType::FixCode, true),
                checkpoint("cp-2", CheckpointType::ExplainToUnlock, false),
                checkpoint("cp-3", CheckpointType::Reflection, false),
            ],
        }
    }

    pub(crate) fn plain_room(room_id: &str) -> RoomRecord {
        RoomRecord {
            room_id: room_id.into(),
            owner_id: "owner".into(),
            is_learning_room: false,
            module_id: None,
            current_checkpoint_index: 0,
        }
    }

    /// Service over a store holding the loops module and room 482913.
    pub(crate) async fn service_with(tutor: Arc<dyn Tutor>) -> (CheckpointService, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        store.insert_room(plain_room("482913"));
        let service = CheckpointService::new(store.clone(), Arc::new(TutorService::new(tutor)));
        service.publish_module(loops_module()).await.unwrap();
        (service, store)
    }

    async fn learning_service() -> (CheckpointService, Arc<MemStore>) {
        let (service, store) = service_with(ScriptedTutor::replying(vec![])).await;
        service.start_module("482913", "loops-beginners", "A").await.unwrap();
        (service, store)
    }

    async fn set_pointer(store: &MemStore, index: usize) {
        let mut room = store.find_room("482913").await.unwrap().unwrap();
        room.current_checkpoint_index = index;
        store.update_room(&room).await.unwrap();
    }

    fn rejection(err: LearningError) -> String {
        match err {
            LearningError::RejectedPrecondition(reason) => reason,
            other => panic!("expected a rejected precondition, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn start_module_binds_room_and_seeds_progress() {
        let (service, store) = service_with(ScriptedTutor::replying(vec![])).await;
        let state = service.start_module("482913", "loops-beginners", "A").await.unwrap();

        assert!(state.room.is_learning_room);
        assert_eq!(state.room.module_id.as_deref(), Some("loops-beginners"));
        assert_eq!(state.progress.current_checkpoint_index, 0);
        assert_eq!(state.progress.checkpoints[0].status, CheckpointStatus::InProgress);
        assert!(state.progress.checkpoints[1..].iter().all(|c| c.status == CheckpointStatus::Pending));
        assert_eq!(store.find_room("482913").await.unwrap().unwrap(), state.room);
    }

    #[tokio::test]
    async fn start_module_rejects_unknown_room_module_and_empty_module() {
        let (service, _store) = service_with(ScriptedTutor::replying(vec![])).await;
        assert!(matches!(
            service.start_module("000000", "loops-beginners", "A").await,
            Err(LearningError::NotFound(_))
        ));
        assert!(matches!(
            service.start_module("482913", "nope", "A").await,
            Err(LearningError::NotFound(_))
        ));

        let mut empty = loops_module();
        empty.module_id = "empty".into();
        empty.checkpoints.clear();
        service.publish_module(empty).await.unwrap();
        assert!(matches!(
            service.start_module("482913", "empty", "A").await,
            Err(LearningError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn rebinding_same_module_keeps_pointer_switching_resets_it() {
        let (service, store) = learning_service().await;
        set_pointer(&store, 2).await;

        let state = service.start_module("482913", "loops-beginners", "A").await.unwrap();
        assert_eq!(state.room.current_checkpoint_index, 2);

        let mut other = loops_module();
        other.module_id = "loops-advanced".into();
        service.publish_module(other).await.unwrap();
        let state = service.start_module("482913", "loops-advanced", "A").await.unwrap();
        assert_eq!(state.room.current_checkpoint_index, 0);
    }

    #[tokio::test]
    async fn state_requires_learning_room_and_seeds_late_joiner_at_pointer() {
        let (service, store) = service_with(ScriptedTutor::replying(vec![])).await;
        assert!(matches!(service.state("482913", "A").await, Err(LearningError::NotFound(_))));

        service.start_module("482913", "loops-beginners", "A").await.unwrap();
        set_pointer(&store, 1).await;
        let state = service.state("482913", "late").await.unwrap();
        assert_eq!(state.progress.current_checkpoint_index, 1);
        assert_eq!(state.module.module_id, "loops-beginners");
    }

    #[tokio::test]
    async fn next_on_plain_checkpoint_needs_no_completion() {
        let (service, store) = learning_service().await;
        let room = service.next("482913", "A", None).await.unwrap();
        assert_eq!(room.current_checkpoint_index, 1);
        let progress = store.find_progress("482913", "loops-beginners", "A").await.unwrap().unwrap();
        assert_eq!(progress.current_checkpoint_index, 1);
    }

    #[tokio::test]
    async fn peer_reviewed_checkpoint_needs_two_completions() {
        let (service, store) = learning_service().await;
        set_pointer(&store, 1).await;

        service.complete("482913", "cp-1", "A").await.unwrap();
        let reason = rejection(service.next("482913", "A", None).await.unwrap_err());
        assert_eq!(reason, "Not enough peer completions for this checkpoint (1/2)");
        assert_eq!(store.find_room("482913").await.unwrap().unwrap().current_checkpoint_index, 1);

        service.complete("482913", "cp-1", "B").await.unwrap();
        let room = service.next("482913", "C", None).await.unwrap();
        assert_eq!(room.current_checkpoint_index, 2);
    }

    #[tokio::test]
    async fn two_completions_then_third_user_advances_everyone() {
        let (service, store) = learning_service().await;

        service.complete("482913", "cp-1", "A").await.unwrap();
        service.complete("482913", "cp-1", "B").await.unwrap();
        let room = service.next("482913", "C", None).await.unwrap();
        assert_eq!(room.current_checkpoint_index, 1);

        let records = store.list_progress("482913", "loops-beginners").await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|p| p.current_checkpoint_index == 1));
    }

    #[tokio::test]
    async fn explain_gate_blocks_until_an_explanation_is_accepted() {
        let tutor = ScriptedTutor::replying(vec![
            Ok("Not quite.\nVERDICT: REJECT".into()),
            Ok("Exactly right.\nVERDICT: ACCEPT".into()),
        ]);
        let (service, store) = service_with(tutor).await;
        service.start_module("482913", "loops-beginners", "A").await.unwrap();
        set_pointer(&store, 2).await;

        let reason = rejection(service.next("482913", "A", None).await.unwrap_err());
        assert_eq!(reason, "Explanation not yet accepted for this checkpoint");

        let rejected = service.submit_explanation("482913", "cp-2", "B", "it loops").await.unwrap();
        assert!(!rejected.accepted);
        let entry = rejected.progress.checkpoint("cp-2").unwrap();
        assert_eq!(entry.status, CheckpointStatus::InProgress);
        assert_eq!(entry.explanation_text.as_deref(), Some("it loops"));
        assert!(service.next("482913", "A", None).await.is_err());

        let accepted = service.submit_explanation("482913", "cp-2", "B", "n drops to zero").await.unwrap();
        assert!(accepted.accepted);
        assert_eq!(accepted.progress.checkpoint("cp-2").unwrap().status, CheckpointStatus::Completed);

        // Anyone's accepted explanation unlocks the room.
        let room = service.next("482913", "A", None).await.unwrap();
        assert_eq!(room.current_checkpoint_index, 3);
    }

    #[tokio::test]
    async fn unavailable_tutor_rejects_explanation() {
        let (service, store) = service_with(ScriptedTutor::replying(vec![])).await;
        service.start_module("482913", "loops-beginners", "A").await.unwrap();
        set_pointer(&store, 2).await;

        let response = service.submit_explanation("482913", "cp-2", "A", "because").await.unwrap();
        assert!(!response.accepted);
        assert_eq!(response.feedback, crate::services::tutor_service::UNAVAILABLE_REPLY);
    }

    #[tokio::test]
    async fn explanation_validation() {
        let (service, _store) = learning_service().await;
        assert!(matches!(
            service.submit_explanation("482913", "cp-2", "A", "   ").await,
            Err(LearningError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.submit_explanation("482913", "cp-0", "A", "text").await,
            Err(LearningError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.submit_explanation("482913", "cp-9", "A", "text").await,
            Err(LearningError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn next_at_last_checkpoint_is_rejected() {
        let (service, store) = learning_service().await;
        set_pointer(&store, 3).await;
        let reason = rejection(service.next("482913", "A", None).await.unwrap_err());
        assert_eq!(reason, "Module already complete");
        assert_eq!(store.find_room("482913").await.unwrap().unwrap().current_checkpoint_index, 3);
    }

    #[tokio::test]
    async fn previous_steps_back_and_stops_at_zero() {
        let (service, store) = learning_service().await;
        service.state("482913", "B").await.unwrap();
        set_pointer(&store, 2).await;

        let room = service.previous("482913", "A", None).await.unwrap();
        assert_eq!(room.current_checkpoint_index, 1);
        let records = store.list_progress("482913", "loops-beginners").await.unwrap();
        assert!(records.iter().all(|p| p.current_checkpoint_index == 1));

        service.previous("482913", "A", None).await.unwrap();
        let reason = rejection(service.previous("482913", "A", None).await.unwrap_err());
        assert_eq!(reason, "Already at the first checkpoint");
        assert_eq!(store.find_room("482913").await.unwrap().unwrap().current_checkpoint_index, 0);
    }

    #[tokio::test]
    async fn stale_from_index_is_rejected() {
        let (service, store) = learning_service().await;
        service.next("482913", "A", Some(0)).await.unwrap();

        let reason = rejection(service.next("482913", "B", Some(0)).await.unwrap_err());
        assert_eq!(reason, "Checkpoint already moved");
        assert_eq!(store.find_room("482913").await.unwrap().unwrap().current_checkpoint_index, 1);
    }

    #[tokio::test]
    async fn racing_next_calls_each_move_one_step() {
        let (service, _store) = learning_service().await;
        let service = Arc::new(service);

        let a = tokio::spawn({
            let service = service.clone();
            async move { service.next("482913", "A", None).await }
        });
        let b = tokio::spawn({
            let service = service.clone();
            async move { service.next("482913", "B", None).await }
        });
        let mut indices = vec![
            a.await.unwrap().map(|r| r.current_checkpoint_index),
            b.await.unwrap().map(|r| r.current_checkpoint_index),
        ];
        indices.sort_by_key(|r| r.as_ref().map(|i| *i).unwrap_or(usize::MAX));

        // cp-0 is ungated and cp-1 blocks without completions.
        assert_eq!(indices[0].as_ref().ok(), Some(&1));
        assert!(indices[1].is_err());
    }

    #[tokio::test]
    async fn room_lock_is_shared_until_released() {
        let (service, _store) = learning_service().await;

        let first = service.room_lock("482913");
        let guard = first.lock().await;
        let waiting = service.room_lock("482913");
        assert!(Arc::ptr_eq(&first, &waiting));
        assert!(waiting.try_lock().is_err());
        assert!(!Arc::ptr_eq(&first, &service.room_lock("111111")));

        drop(guard);
        drop(first);
        drop(waiting);
        service.room_lock("222222");
        assert_eq!(service.room_locks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn complete_and_reflect_touch_only_the_caller() {
        let (service, store) = learning_service().await;
        service.state("482913", "B").await.unwrap();

        service.complete("482913", "cp-0", "A").await.unwrap();
        let progress = service.reflect("482913", "cp-3", "A", "Loops repeat work").await.unwrap();
        assert_eq!(progress.checkpoint("cp-3").unwrap().reflection_text.as_deref(), Some("Loops repeat work"));
        assert!(progress.is_completed("cp-0"));

        let other = store.find_progress("482913", "loops-beginners", "B").await.unwrap().unwrap();
        assert!(!other.is_completed("cp-0"));
        assert_eq!(store.find_room("482913").await.unwrap().unwrap().current_checkpoint_index, 0);

        assert!(matches!(
            service.reflect("482913", "cp-3", "A", " ").await,
            Err(LearningError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.complete("482913", "missing", "A").await,
            Err(LearningError::NotFound(_))
        ));
    }
}
