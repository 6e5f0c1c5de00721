//! The RigChat conversational pipeline.
//!
//! One inbound message becomes one **turn**:
//!
//! 1. **Resolve** the session (create it on first contact)
//! 2. **Moderate** the raw text; everything after sees only the sanitized form
//! 3. **Classify** intent and extract entities
//! 4. **Retrieve** grounding knowledge for the intent's category
//! 5. **Assemble** the prompt from context, knowledge and recent history
//! 6. **Generate** the reply through the completion client
//! 7. **Persist** both messages and the updated session state/context
//!
//! [`ChatService`] is the inbound surface; [`Orchestrator`] runs the turn.

pub mod classifier;
pub mod locks;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;
pub mod service;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use classifier::{EntityExtractor, IntentClassifier};
pub use locks::SessionLocks;
pub use orchestrator::{Orchestrator, TurnEvent, TurnOutcome, TurnState, TurnStream};
pub use prompt::PromptAssembler;
pub use retriever::KnowledgeRetriever;
pub use service::{ChatService, FeedbackInput, ReplyMetadata, SendMessageResponse, SessionCreated, SessionEnded};
pub use session::{HistoryPage, Pagination, SessionManager};
