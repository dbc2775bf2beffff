pub mod tutor_client;

pub use tutor_client::{GeminiClient, Tutor, TutorError, UnconfiguredTutor};
