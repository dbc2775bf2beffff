use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::learning::AiMode;

/// Request payload for the tutor endpoint
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TutorRequest {
    pub user_query: String,
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    pub checkpoint_type: Option<String>,
    pub checkpoint_title: Option<String>,
    pub checkpoint_description: Option<String>,
    pub ai_mode: Option<AiMode>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TutorResponse {
    pub ai_response_text: String,
}
