use async_trait::async_trait;
use tracing::info;

use super::{DialogueState, DialogueStep, Services, StepResult, Turn};
use crate::error::Result;

/// Small talk in the middle of a transaction keeps the remembered intent.
pub struct IntentCarryOver;

#[async_trait]
impl DialogueStep for IntentCarryOver {
    fn state(&self) -> DialogueState {
        DialogueState::IntentCarryOver
    }

    async fn run(&self, turn: &mut Turn, _services: &Services) -> Result<StepResult> {
        let soft = turn.intent().is_some_and(|intent| intent.is_soft());
        let remembered = turn
            .session
            .last_valid_intent
            .clone()
            .filter(|intent| intent.is_cart_affecting());

        if let (true, Some(carried)) = (soft, remembered) {
            info!(
                session_id = %turn.session.session_id,
                from = ?turn.intent(),
                to = %carried,
                "Carrying over previous intent"
            );
            turn.classification.intent = Some(carried);
        }
        Ok(StepResult::pass())
    }
}
