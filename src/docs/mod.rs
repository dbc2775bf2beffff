use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Live rooms, connections and host figures
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Ask the AI tutor
#[utoipa::path(
    post,
    path = "/api/ai-tutor",
    request_body = TutorRequest,
    responses(
        (status = 200, description = "Tutor reply, or a fallback text when the tutor is unavailable", body = TutorResponse),
        (status = 400, description = "userQuery, language or code missing", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn ai_tutor_doc() {}

/// List learning modules
#[utoipa::path(
    get,
    path = "/api/learning/modules",
    responses(
        (status = 200, description = "All published modules", body = ModuleListResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn list_modules_doc() {}

/// Bind a room to a learning module
#[utoipa::path(
    post,
    path = "/api/learning/room/create",
    request_body = StartModuleRequest,
    responses(
        (status = 200, description = "Room bound, caller's progress created", body = LearningStateResponse),
        (status = 400, description = "Module has no checkpoints", body = ErrorResponse),
        (status = 404, description = "Room or module not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn start_module_doc() {}

/// Learning state of a room for the caller
#[utoipa::path(
    get,
    path = "/api/learning/room/{room_id}/state",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Room, module and the caller's progress", body = LearningStateResponse),
        (status = 404, description = "Not a learning room", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn room_state_doc() {}

/// Advance the room pointer by one checkpoint
#[utoipa::path(
    post,
    path = "/api/learning/room/{room_id}/next",
    params(("room_id" = String, Path, description = "Room id")),
    request_body(content = MoveRequest, description = "Optional; guards against a pointer that already moved"),
    responses(
        (status = 200, description = "Pointer advanced", body = RoomPointerResponse),
        (status = 404, description = "Not a learning room", body = ErrorResponse),
        (status = 409, description = "A gate is not satisfied", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn next_checkpoint_doc() {}

/// Move the room pointer back by one checkpoint
#[utoipa::path(
    post,
    path = "/api/learning/room/{room_id}/previous",
    params(("room_id" = String, Path, description = "Room id")),
    request_body(content = MoveRequest, description = "Optional; guards against a pointer that already moved"),
    responses(
        (status = 200, description = "Pointer moved back", body = RoomPointerResponse),
        (status = 409, description = "Already at the first checkpoint", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn previous_checkpoint_doc() {}

/// Mark the caller's checkpoint completed
#[utoipa::path(
    post,
    path = "/api/learning/room/{room_id}/checkpoints/{checkpoint_id}/complete",
    params(
        ("room_id" = String, Path, description = "Room id"),
        ("checkpoint_id" = String, Path, description = "Checkpoint id")
    ),
    responses(
        (status = 200, description = "Updated progress", body = ProgressResponse),
        (status = 404, description = "Room or checkpoint not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn complete_checkpoint_doc() {}

/// Submit an explanation for review
#[utoipa::path(
    post,
    path = "/api/learning/room/{room_id}/checkpoints/{checkpoint_id}/explain",
    params(
        ("room_id" = String, Path, description = "Room id"),
        ("checkpoint_id" = String, Path, description = "Checkpoint id")
    ),
    request_body = ExplanationRequest,
    responses(
        (status = 200, description = "Verdict, tutor feedback and updated progress", body = ExplanationResponse),
        (status = 400, description = "Empty text or not an explain-to-unlock checkpoint", body = ErrorResponse),
        (status = 404, description = "Room or checkpoint not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn explain_checkpoint_doc() {}

/// Store a reflection
#[utoipa::path(
    post,
    path = "/api/learning/room/{room_id}/checkpoints/{checkpoint_id}/reflect",
    params(
        ("room_id" = String, Path, description = "Room id"),
        ("checkpoint_id" = String, Path, description = "Checkpoint id")
    ),
    request_body = ReflectionRequest,
    responses(
        (status = 200, description = "Updated progress", body = ProgressResponse),
        (status = 400, description = "Empty reflection", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[allow(dead_code)]
pub async fn reflect_checkpoint_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        ai_tutor_doc,
        list_modules_doc,
        start_module_doc,
        room_state_doc,
        next_checkpoint_doc,
        previous_checkpoint_doc,
        complete_checkpoint_doc,
        explain_checkpoint_doc,
        reflect_checkpoint_doc,
    ),
    components(
        schemas(
            HealthResponse, DiagnosticsResponse, ErrorResponse,
            TutorRequest, TutorResponse,
            CheckpointType, AiMode, Difficulty, Checkpoint, LearningModule, RoomRecord,
            CheckpointStatus, CheckpointProgress, Progress,
            StartModuleRequest, MoveRequest, ExplanationRequest, ReflectionRequest,
            ModuleListResponse, LearningStateResponse, RoomPointerResponse, ProgressResponse, ExplanationResponse
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
