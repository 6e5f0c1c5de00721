//! Intent classification and entity extraction.
//!
//! Both are pure functions over lowercased text and fixed lexicons; they
//! never fail and never touch I/O.

pub mod entities;
pub mod intent;
pub mod lexicon;

pub use entities::EntityExtractor;
pub use intent::IntentClassifier;
