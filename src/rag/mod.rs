//! Question answering over the knowledge base.

pub mod prompt;
pub mod service;
pub mod synthesizer;
pub mod types;

pub use service::{RagApi, RagService};
pub use synthesizer::AnswerSynthesizer;
pub use types::{AnswerOutcome, NO_RELEVANT_CONTENT_MESSAGE, NOT_READY_MESSAGE, RagError};
