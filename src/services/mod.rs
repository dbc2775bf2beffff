pub mod auth_service;
pub mod checkpoint_service;
pub mod tutor_service;

pub use checkpoint_service::{CheckpointService, LearningError};
pub use tutor_service::TutorService;
