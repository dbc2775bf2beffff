pub mod diagnostics;
pub mod error;
pub mod health;
pub mod learning;
pub mod messages;
pub mod tutor;

pub use diagnostics::*;
pub use error::*;
pub use health::*;
pub use learning::*;
pub use messages::*;
pub use tutor::*;
