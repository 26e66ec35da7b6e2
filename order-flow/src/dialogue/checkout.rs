use async_trait::async_trait;
use tracing::info;

use super::{DialogueState, DialogueStep, Services, StepResult, Turn};
use crate::cart::{EMPTY_CART_MESSAGE, Finalization};
use crate::classifier::Intent;
use crate::error::Result;

/// While checkout is in progress the whole message is the delivery details.
pub struct CheckoutDetails;

#[async_trait]
impl DialogueStep for CheckoutDetails {
    fn state(&self) -> DialogueState {
        DialogueState::CheckoutDetails
    }

    async fn run(&self, turn: &mut Turn, services: &Services) -> Result<StepResult> {
        if !turn.session.awaiting_customer_details {
            return Ok(StepResult::pass());
        }

        let session_id = turn.session.session_id.clone();
        let outcome = services.ledger.finalize(&session_id, &turn.message).await?;
        match &outcome {
            Finalization::Confirmed(order) => {
                info!(session_id = %session_id, order_id = %order.order_id, "Checkout completed");
                turn.session.reset_to_idle();
            }
            // Nothing left to send; stop waiting for details
            Finalization::EmptyCart => turn.session.reset_to_idle(),
            // Flag stays set so resending the details retries
            Finalization::Failed(_) => {}
        }
        Ok(StepResult::reply(outcome.message()))
    }
}

/// Summarises the cart and asks for name and address.
pub struct CheckoutRequest;

#[async_trait]
impl DialogueStep for CheckoutRequest {
    fn state(&self) -> DialogueState {
        DialogueState::CheckoutRequest
    }

    async fn run(&self, turn: &mut Turn, services: &Services) -> Result<StepResult> {
        if turn.intent() != Some(&Intent::Checkout) {
            return Ok(StepResult::pass());
        }

        let session_id = turn.session.session_id.clone();
        if services.ledger.cart(&session_id).await?.is_empty() {
            turn.consume_intent();
            return Ok(StepResult::reply(EMPTY_CART_MESSAGE));
        }

        let summary = services.ledger.show(&session_id).await?;
        turn.session.awaiting_customer_details = true;
        info!(session_id = %session_id, "Checkout started, waiting for customer details");
        Ok(StepResult::reply(format!(
            "Perfecto 👍 Este es el resumen de tu pedido:\n\n{summary}\n\nPor favor, decime tu nombre y dirección para coordinar la entrega. 😊"
        )))
    }
}
