//! The per-turn decision procedure.
//!
//! A [`Dialogue`] is an ordered list of [`DialogueStep`]s plus a fallback. Steps
//! are evaluated in order against the current [`Turn`]; the first one that
//! returns [`NextAction::End`] produces the reply. A step that fails hands the
//! turn to the fallback in recovery mode.

mod add_item;
mod browse;
mod cart_commands;
mod carry_over;
mod checkout;
mod conversation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use crate::cart::CartLedger;
use crate::catalog::CatalogLookup;
use crate::classifier::{Classification, Intent};
use crate::config::DialogueConfig;
use crate::dish::DishResolver;
use crate::error::Result;
use crate::oracle::Oracle;
use crate::render::ProductPresenter;
use crate::session::SessionState;
use crate::transcript::TranscriptStore;

pub use add_item::AddItem;
pub use browse::ProductMention;
pub use cart_commands::{ClearCart, RemoveItem, ShowCart};
pub use carry_over::IntentCarryOver;
pub use checkout::{CheckoutDetails, CheckoutRequest};
pub use conversation::Conversation;

/// Fixed reply when nothing better can be produced.
pub const APOLOGY: &str = "Perdón, tuve un problema para responderte 😕. ¿Podés repetirlo en un momento?";

const CATALOG_DOWN: &str =
    "No pude consultar los productos en este momento 😕. Probá de nuevo en un ratito.";

/// The states of the decision procedure, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogueState {
    CheckoutDetails,
    IntentCarryOver,
    CheckoutRequest,
    AddItem,
    ShowCart,
    RemoveItem,
    ClearCart,
    ProductMention,
    Conversation,
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything a step may read or change during one inbound message
#[derive(Debug, Clone)]
pub struct Turn {
    pub session: SessionState,
    pub message: String,
    pub classification: Classification,
    /// Classified locally from a referential or confirming reply
    pub shortcut: bool,
    /// A step failed earlier in this turn
    pub recovering: bool,
}

impl Turn {
    pub fn new(session: SessionState, message: impl Into<String>, classification: Classification) -> Self {
        Self {
            session,
            message: message.into(),
            classification,
            shortcut: false,
            recovering: false,
        }
    }

    pub fn intent(&self) -> Option<&Intent> {
        self.classification.intent.as_ref()
    }

    pub fn confidence(&self) -> u8 {
        self.classification.confidence_or_zero()
    }

    pub fn products(&self) -> &[String] {
        &self.classification.products
    }

    /// Forgets a one-shot intent once acted on, so small talk does not repeat it.
    pub fn consume_intent(&mut self) {
        self.session.last_valid_intent = None;
        self.session.last_detected_product = None;
    }
}

/// Collaborators shared by every step
pub struct Services {
    pub catalog: CatalogLookup,
    pub ledger: CartLedger,
    pub dishes: DishResolver,
    pub presenter: ProductPresenter,
    pub chat_oracle: Arc<dyn Oracle>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub config: DialogueConfig,
}

impl Services {
    /// Wires the collaborators. Dish decomposition uses the classification
    /// oracle; list rendering and conversation use the generation oracle.
    pub fn new(
        catalog: CatalogLookup,
        ledger: CartLedger,
        classification_oracle: Arc<dyn Oracle>,
        chat_oracle: Arc<dyn Oracle>,
        transcripts: Arc<dyn TranscriptStore>,
        config: DialogueConfig,
    ) -> Self {
        Self {
            dishes: DishResolver::new(classification_oracle, catalog.clone()),
            presenter: ProductPresenter::new(chat_oracle.clone(), config.oracle_rendering),
            catalog,
            ledger,
            chat_oracle,
            transcripts,
            config,
        }
    }
}

/// Defines what should happen after a step completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// The step does not apply; evaluate the next one
    Continue,
    /// The step produced the reply
    End,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub response: Option<String>,
    pub next_action: NextAction,
}

impl StepResult {
    pub fn reply(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            next_action: NextAction::End,
        }
    }

    pub fn pass() -> Self {
        Self {
            response: None,
            next_action: NextAction::Continue,
        }
    }
}

/// One state of the decision procedure
#[async_trait]
pub trait DialogueStep: Send + Sync {
    fn state(&self) -> DialogueState;

    async fn run(&self, turn: &mut Turn, services: &Services) -> Result<StepResult>;
}

/// Reply of a turn and the state that produced it
#[derive(Debug, Clone)]
pub struct DialogueReply {
    pub response: String,
    pub state: DialogueState,
}

pub struct Dialogue {
    steps: Vec<Arc<dyn DialogueStep>>,
    fallback: Arc<dyn DialogueStep>,
}

impl Dialogue {
    pub async fn execute(&self, turn: &mut Turn, services: &Services) -> Result<DialogueReply> {
        for step in &self.steps {
            let state = step.state();
            match step.run(turn, services).await {
                Ok(StepResult {
                    next_action: NextAction::End,
                    response,
                }) => {
                    debug!(session_id = %turn.session.session_id, state = %state, "Step produced the reply");
                    return Ok(DialogueReply {
                        response: response.unwrap_or_default().trim().to_string(),
                        state,
                    });
                }
                Ok(_) => continue,
                Err(e) => {
                    error!(
                        session_id = %turn.session.session_id,
                        state = %state,
                        error = %e,
                        "Step failed, handing the turn to the fallback"
                    );
                    turn.recovering = true;
                    break;
                }
            }
        }

        let result = self.fallback.run(turn, services).await?;
        Ok(DialogueReply {
            response: result
                .response
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| APOLOGY.to_string()),
            state: self.fallback.state(),
        })
    }

    pub fn states(&self) -> Vec<DialogueState> {
        self.steps
            .iter()
            .map(|s| s.state())
            .chain(std::iter::once(self.fallback.state()))
            .collect()
    }
}

/// Builder for creating dialogues
pub struct DialogueBuilder {
    steps: Vec<Arc<dyn DialogueStep>>,
    fallback: Option<Arc<dyn DialogueStep>>,
}

impl DialogueBuilder {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            fallback: None,
        }
    }

    pub fn add_step(mut self, step: Arc<dyn DialogueStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn set_fallback(mut self, step: Arc<dyn DialogueStep>) -> Self {
        self.fallback = Some(step);
        self
    }

    pub fn build(self) -> Dialogue {
        Dialogue {
            steps: self.steps,
            fallback: self.fallback.unwrap_or_else(|| Arc::new(Conversation)),
        }
    }
}

impl Default for DialogueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The order-taking dialogue with every state in its evaluation order.
pub fn default_dialogue() -> Dialogue {
    DialogueBuilder::new()
        .add_step(Arc::new(CheckoutDetails))
        .add_step(Arc::new(IntentCarryOver))
        .add_step(Arc::new(CheckoutRequest))
        .add_step(Arc::new(AddItem))
        .add_step(Arc::new(ShowCart))
        .add_step(Arc::new(RemoveItem))
        .add_step(Arc::new(ClearCart))
        .add_step(Arc::new(ProductMention))
        .set_fallback(Arc::new(Conversation))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalogStore;
    use crate::error::{FlowError, OracleError};
    use crate::fulfillment::LogFulfillment;
    use crate::storage::InMemoryCartStorage;
    use crate::transcript::{ChatMessage, InMemoryTranscriptStore};

    struct EchoOracle;

    #[async_trait]
    impl Oracle for EchoOracle {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, OracleError> {
            Ok(prompt.to_string())
        }
        async fn chat(
            &self,
            message: &str,
            _: &[ChatMessage],
        ) -> std::result::Result<String, OracleError> {
            Ok(format!("echo: {message}"))
        }
    }

    struct Failing;

    #[async_trait]
    impl DialogueStep for Failing {
        fn state(&self) -> DialogueState {
            DialogueState::AddItem
        }
        async fn run(&self, _: &mut Turn, _: &Services) -> Result<StepResult> {
            Err(FlowError::StepExecutionFailed("boom".into()))
        }
    }

    struct Never;

    #[async_trait]
    impl DialogueStep for Never {
        fn state(&self) -> DialogueState {
            DialogueState::ShowCart
        }
        async fn run(&self, _: &mut Turn, _: &Services) -> Result<StepResult> {
            Ok(StepResult::reply("should not run"))
        }
    }

    fn services() -> Services {
        let oracle: Arc<dyn Oracle> = Arc::new(EchoOracle);
        Services::new(
            CatalogLookup::new(Arc::new(InMemoryCatalogStore::new(Vec::new()))),
            CartLedger::new(Arc::new(InMemoryCartStorage::new()), Arc::new(LogFulfillment)),
            oracle.clone(),
            oracle,
            Arc::new(InMemoryTranscriptStore::new()),
            DialogueConfig::default(),
        )
    }

    #[test]
    fn test_default_dialogue_order() {
        assert_eq!(
            default_dialogue().states(),
            vec![
                DialogueState::CheckoutDetails,
                DialogueState::IntentCarryOver,
                DialogueState::CheckoutRequest,
                DialogueState::AddItem,
                DialogueState::ShowCart,
                DialogueState::RemoveItem,
                DialogueState::ClearCart,
                DialogueState::ProductMention,
                DialogueState::Conversation,
            ]
        );
    }

    #[tokio::test]
    async fn test_unclassified_message_reaches_conversation() {
        let mut turn = Turn::new(SessionState::new("s1"), "hola", Classification::default());
        let reply = default_dialogue().execute(&mut turn, &services()).await.unwrap();
        assert_eq!(reply.state, DialogueState::Conversation);
        assert_eq!(reply.response, "echo: hola");
    }

    #[tokio::test]
    async fn test_failing_step_hands_over_to_fallback_in_recovery() {
        let dialogue = DialogueBuilder::new()
            .add_step(Arc::new(Failing))
            .add_step(Arc::new(Never))
            .build();
        let mut turn = Turn::new(SessionState::new("s1"), "hola", Classification::default());

        let reply = dialogue.execute(&mut turn, &services()).await.unwrap();
        assert!(turn.recovering);
        assert_eq!(reply.state, DialogueState::Conversation);
        assert!(reply.response.starts_with("echo: "));
        assert_ne!(reply.response, "echo: hola");
    }
}
