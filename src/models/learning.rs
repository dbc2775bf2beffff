use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointType {
    PredictOutput,
    FixCode,
    WriteCode,
    ExplainToUnlock,
    Reflection,
}

impl CheckpointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointType::PredictOutput => "predict-output",
            CheckpointType::FixCode => "fix-code",
            CheckpointType::WriteCode => "write-code",
            CheckpointType::ExplainToUnlock => "explain-to-unlock",
            CheckpointType::Reflection => "reflection",
        }
    }
}

/// Constraint on how the tutor answers inside a checkpoint.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiMode {
    Socratic,
    Hint,
    Review,
    Summarizer,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// One ordered step of a learning module
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub checkpoint_type: CheckpointType,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starter_code: Option<String>,
    #[serde(default)]
    pub read_only_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub require_peer_review: bool,
    pub ai_mode: AiMode,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LearningModule {
    pub module_id: String,
    pub title: String,
    pub language: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub estimated_time_minutes: u32,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

impl LearningModule {
    pub fn checkpoint(&self, checkpoint_id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.checkpoint_id == checkpoint_id)
    }

    pub fn last_index(&self) -> usize {
        self.checkpoints.len().saturating_sub(1)
    }
}

/// Durable room record; the coordinator only reads and moves the learning fields.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub room_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub is_learning_room: bool,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub current_checkpoint_index: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointProgress {
    pub checkpoint_id: String,
    pub status: CheckpointStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_text: Option<String>,
    #[serde(default)]
    pub explanation_accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection_text: Option<String>,
}

/// Personal progress of one user through one module inside one room.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub room_id: String,
    pub module_id: String,
    pub user_id: String,
    pub current_checkpoint_index: usize,
    pub checkpoints: Vec<CheckpointProgress>,
}

impl Progress {
    /// Fresh record: first checkpoint in progress, the rest pending. The
    /// personal pointer starts at the room pointer so late joiners are not behind.
    pub fn seeded(room_id: &str, module: &LearningModule, user_id: &str, room_index: usize) -> Self {
        let checkpoints = module
            .checkpoints
            .iter()
            .enumerate()
            .map(|(i, c)| CheckpointProgress {
                checkpoint_id: c.checkpoint_id.clone(),
                status: if i == 0 { CheckpointStatus::InProgress } else { CheckpointStatus::Pending },
                explanation_text: None,
                explanation_accepted: false,
                reflection_text: None,
            })
            .collect();
        Self {
            room_id: room_id.to_string(),
            module_id: module.module_id.clone(),
            user_id: user_id.to_string(),
            current_checkpoint_index: room_index.min(module.last_index()),
            checkpoints,
        }
    }

    pub fn checkpoint(&self, checkpoint_id: &str) -> Option<&CheckpointProgress> {
        self.checkpoints.iter().find(|c| c.checkpoint_id == checkpoint_id)
    }

    /// Entry for a checkpoint, created as pending when the record predates it.
    pub fn checkpoint_mut(&mut self, checkpoint_id: &str) -> &mut CheckpointProgress {
        let pos = match self.checkpoints.iter().position(|c| c.checkpoint_id == checkpoint_id) {
            Some(pos) => pos,
            None => {
                self.checkpoints.push(CheckpointProgress {
                    checkpoint_id: checkpoint_id.to_string(),
                    status: CheckpointStatus::Pending,
                    explanation_text: None,
                    explanation_accepted: false,
                    reflection_text: None,
                });
                self.checkpoints.len() - 1
            }
        };
        &mut self.checkpoints[pos]
    }

    pub fn is_completed(&self, checkpoint_id: &str) -> bool {
        self.checkpoint(checkpoint_id)
            .map(|c| c.status == CheckpointStatus::Completed)
            .unwrap_or(false)
    }

    pub fn has_accepted_explanation(&self, checkpoint_id: &str) -> bool {
        self.checkpoint(checkpoint_id)
            .map(|c| c.explanation_accepted)
            .unwrap_or(false)
    }
}

/// Request payload for binding a room to a module
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartModuleRequest {
    pub room_id: String,
    pub module_id: String,
}

/// Optional body for `next` / `previous`
#[derive(Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub from_index: Option<usize>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ExplanationRequest {
    pub explanation: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReflectionRequest {
    pub reflection: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ModuleListResponse {
    pub modules: Vec<LearningModule>,
}

/// Everything a learner needs to render the learning room
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct LearningStateResponse {
    pub room: RoomRecord,
    pub module: LearningModule,
    pub progress: Progress,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct RoomPointerResponse {
    pub room: RoomRecord,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ProgressResponse {
    pub progress: Progress,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ExplanationResponse {
    pub accepted: bool,
    pub feedback: String,
    pub progress: Progress,
}
