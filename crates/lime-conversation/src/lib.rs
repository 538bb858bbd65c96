pub mod state;

pub use lime_core::DEFAULT_GREETING;
pub use state::{ConversationState, TurnOutcome, FALLBACK_MESSAGE};
