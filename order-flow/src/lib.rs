pub mod cart;
pub mod catalog;
#[cfg(feature = "postgres")]
pub mod catalog_postgres;
pub mod classifier;
pub mod config;
pub mod dialogue;
pub mod dish;
pub mod error;
pub mod fulfillment;
pub mod oracle;
pub mod quantity;
pub mod render;
pub mod runner;
pub mod session;
pub mod storage;
pub mod summary;
pub mod text;
pub mod transcript;

// Re-export commonly used types
pub use cart::{Cart, CartLedger, Finalization, LineItem};
pub use catalog::{CatalogEntry, CatalogLookup, CatalogStore, InMemoryCatalogStore, LookupOutcome};
#[cfg(feature = "postgres")]
pub use catalog_postgres::PostgresCatalogStore;
pub use classifier::{Classification, Intent, IntentClassifier};
pub use config::DialogueConfig;
pub use dialogue::{
    Dialogue, DialogueBuilder, DialogueState, DialogueStep, NextAction, Services, StepResult, Turn,
    default_dialogue,
};
pub use dish::DishResolver;
pub use error::{CatalogError, FlowError, FulfillmentError, OracleError, Result};
#[cfg(feature = "http")]
pub use fulfillment::HttpFulfillment;
pub use fulfillment::{FinalizedOrder, Fulfillment, LogFulfillment};
pub use oracle::{Oracle, TimeoutOracle};
pub use quantity::parse_quantity;
pub use runner::{TurnOutcome, TurnRunner};
pub use session::SessionState;
pub use storage::{
    CartStorage, InMemoryCartStorage, InMemorySessionStorage, SessionLocks, SessionStorage,
};
pub use summary::Summarizer;
pub use transcript::{
    ChatMessage, FileTranscriptStore, InMemoryTranscriptStore, MessageRole, TranscriptStore,
};
