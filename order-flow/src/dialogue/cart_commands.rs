use async_trait::async_trait;
use tracing::{info, warn};

use super::{DialogueState, DialogueStep, Services, StepResult, Turn};
use crate::classifier::Intent;
use crate::error::Result;
use crate::oracle::clean_reply;
use crate::text::phrase_matches;

const SHOW_CART_QUESTION: &str = "¿Querés que te muestre cómo va tu pedido?";
const CLEAR_CART_QUESTION: &str = "¿Seguro que querés vaciar tu pedido? 🧺";

pub struct ShowCart;

#[async_trait]
impl DialogueStep for ShowCart {
    fn state(&self) -> DialogueState {
        DialogueState::ShowCart
    }

    async fn run(&self, turn: &mut Turn, services: &Services) -> Result<StepResult> {
        if turn.intent() != Some(&Intent::ShowCart) {
            return Ok(StepResult::pass());
        }

        if turn.confidence() >= services.config.show_cart_threshold {
            let summary = services.ledger.show(&turn.session.session_id).await?;
            return Ok(StepResult::reply(summary));
        }

        let prompt = format!(
            "El cliente dijo: \"{}\". Preguntale de forma breve y amable si quiere ver su pedido actual.",
            turn.message
        );
        let question = match services
            .chat_oracle
            .complete(&prompt)
            .await
            .and_then(|raw| clean_reply(&raw))
        {
            Ok(question) => question,
            Err(e) => {
                warn!(session_id = %turn.session.session_id, error = %e, "Show-cart confirmation failed");
                SHOW_CART_QUESTION.to_string()
            }
        };
        Ok(StepResult::reply(question))
    }
}

pub struct RemoveItem;

#[async_trait]
impl DialogueStep for RemoveItem {
    fn state(&self) -> DialogueState {
        DialogueState::RemoveItem
    }

    async fn run(&self, turn: &mut Turn, services: &Services) -> Result<StepResult> {
        if turn.intent() != Some(&Intent::RemoveItem) || turn.products().is_empty() {
            return Ok(StepResult::pass());
        }

        if turn.confidence() < services.config.clear_threshold {
            return Ok(StepResult::reply(format!(
                "¿Querés que saque {} de tu pedido?",
                turn.products()[0]
            )));
        }

        let session_id = turn.session.session_id.clone();
        let cart = services.ledger.cart(&session_id).await?;
        let phrase = turn
            .products()
            .iter()
            .find(|phrase| cart.items.iter().any(|item| phrase_matches(phrase, &item.name)))
            .unwrap_or(&turn.products()[0])
            .clone();

        let reply = services.ledger.remove(&session_id, &phrase).await?;
        turn.consume_intent();
        Ok(StepResult::reply(reply))
    }
}

pub struct ClearCart;

#[async_trait]
impl DialogueStep for ClearCart {
    fn state(&self) -> DialogueState {
        DialogueState::ClearCart
    }

    async fn run(&self, turn: &mut Turn, services: &Services) -> Result<StepResult> {
        if turn.intent() != Some(&Intent::ClearCart) {
            return Ok(StepResult::pass());
        }

        if turn.confidence() < services.config.clear_threshold {
            return Ok(StepResult::reply(CLEAR_CART_QUESTION));
        }

        info!(session_id = %turn.session.session_id, "Clearing cart on request");
        let reply = services.ledger.clear(&turn.session.session_id).await?;
        turn.consume_intent();
        Ok(StepResult::reply(reply))
    }
}
