//! TurnRunner: processes exactly one inbound customer message.
//!
//! Holds the session's lock for the whole turn, so a second message from the
//! same customer waits until the first one has been answered and persisted:
//! load → classify → decide → record → save.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    cart::Cart,
    classifier::{Classification, ClassifierContext, IntentClassifier, ShortcutOutcome},
    dialogue::{APOLOGY, Dialogue, DialogueState, Services, Turn},
    error::Result,
    session::SessionState,
    storage::{SessionLocks, SessionStorage},
    summary::Summarizer,
    transcript::ChatMessage,
};

/// The reply to one message and the state that produced it
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub state: DialogueState,
}

#[derive(Clone)]
pub struct TurnRunner {
    dialogue: Arc<Dialogue>,
    services: Arc<Services>,
    sessions: Arc<dyn SessionStorage>,
    classifier: IntentClassifier,
    summarizer: Option<Summarizer>,
    locks: SessionLocks,
}

impl TurnRunner {
    pub fn new(
        dialogue: Arc<Dialogue>,
        services: Arc<Services>,
        sessions: Arc<dyn SessionStorage>,
        classifier: IntentClassifier,
    ) -> Self {
        Self {
            dialogue,
            services,
            sessions,
            classifier,
            summarizer: None,
            locks: SessionLocks::new(),
        }
    }

    /// Enables rolling summaries, when the dialogue config allows them.
    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        if self.services.config.summaries_enabled {
            self.summarizer = Some(summarizer);
        }
        self
    }

    /// Handles the message and returns the reply. Never fails: any error is
    /// logged and answered with a fixed apology.
    pub async fn respond(&self, session_id: &str, message: &str) -> String {
        match self.run(session_id, message).await {
            Ok(outcome) => outcome.response,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Turn failed");
                APOLOGY.to_string()
            }
        }
    }

    pub async fn run(&self, session_id: &str, message: &str) -> Result<TurnOutcome> {
        let _guard = self.locks.acquire(session_id).await;

        let mut session = self.sessions.get_or_create(session_id).await?;
        let (classification, shortcut) = self.classify(&mut session, message).await;

        if let Some(intent) = classification
            .intent
            .clone()
            .filter(|intent| intent.is_cart_affecting())
        {
            session.last_valid_intent = Some(intent);
            session.last_detected_product = classification.products.first().cloned();
        }

        let mut turn = Turn::new(session, message, classification);
        turn.shortcut = shortcut;
        let reply = self.dialogue.execute(&mut turn, &self.services).await?;

        info!(
            session_id = %session_id,
            state = %reply.state,
            intent = ?turn.intent(),
            confidence = turn.confidence(),
            "Turn answered"
        );

        self.record(&mut turn.session, message, &reply.response).await;

        turn.session.touch();
        self.sessions.save(turn.session).await?;

        Ok(TurnOutcome {
            response: reply.response,
            state: reply.state,
        })
    }

    /// Session and cart as currently stored.
    pub async fn snapshot(&self, session_id: &str) -> Result<Option<(SessionState, Cart)>> {
        let Some(session) = self.sessions.get(session_id).await? else {
            return Ok(None);
        };
        let cart = self.services.ledger.cart(session_id).await?;
        Ok(Some((session, cart)))
    }

    async fn classify(
        &self,
        session: &mut SessionState,
        message: &str,
    ) -> (Classification, bool) {
        // A confirmation question is only answered by the very next message
        let pending_confirmation = session.pending_confirmation.take();

        // The whole message is delivery details; nothing to classify
        if session.awaiting_customer_details {
            return Default::default();
        }

        let last_bot_reply = match self
            .services
            .transcripts
            .last_assistant_message(&session.session_id)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Could not read last reply");
                None
            }
        };

        let context = ClassifierContext {
            conversation_summary: session.conversation_summary.clone(),
            product_summary: session.product_summary.clone(),
            shown_product_names: session.shown_product_names(),
            last_bot_reply,
            pending_confirmation,
        };

        match self.classifier.shortcut(message, &context) {
            ShortcutOutcome::Classified(classification) => {
                info!(
                    session_id = %session.session_id,
                    products = ?classification.products,
                    "Short reply resolved without the classifier"
                );
                (classification, true)
            }
            ShortcutOutcome::DeclinedPending | ShortcutOutcome::None => {
                (self.classifier.classify(message, &context).await, false)
            }
        }
    }

    /// Appends the exchange to the transcript and refreshes the summaries.
    /// Failures here only cost future context.
    async fn record(&self, session: &mut SessionState, message: &str, response: &str) {
        let transcripts = &self.services.transcripts;
        let id = session.session_id.clone();

        for entry in [ChatMessage::user(message), ChatMessage::assistant(response)] {
            if let Err(e) = transcripts.append(&id, entry).await {
                warn!(session_id = %id, error = %e, "Could not append to transcript");
            }
        }

        let Some(summarizer) = &self.summarizer else {
            return;
        };
        match transcripts.last(&id, self.services.config.summary_window).await {
            Ok(recent) => summarizer.refresh(session, &recent).await,
            Err(e) => warn!(session_id = %id, error = %e, "Could not read transcript for summaries"),
        }
    }
}
