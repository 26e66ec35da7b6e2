use async_trait::async_trait;
use tracing::{info, warn};

use super::browse::look_up_phrases;
use super::{APOLOGY, CATALOG_DOWN, DialogueState, DialogueStep, Services, StepResult, Turn};
use crate::catalog::CatalogEntry;
use crate::classifier::Intent;
use crate::error::Result;
use crate::oracle::clean_reply;
use crate::quantity::parse_quantity;

/// ADD_ITEM with at least one product phrase.
///
/// Low confidence asks first. Otherwise a product already on the customer's
/// screen is added directly; anything else is looked up and listed so the
/// customer can pick, never guessed.
pub struct AddItem;

#[async_trait]
impl DialogueStep for AddItem {
    fn state(&self) -> DialogueState {
        DialogueState::AddItem
    }

    async fn run(&self, turn: &mut Turn, services: &Services) -> Result<StepResult> {
        if turn.intent() != Some(&Intent::AddItem) || turn.products().is_empty() {
            return Ok(StepResult::pass());
        }
        let session_id = turn.session.session_id.clone();

        if turn.confidence() < services.config.add_threshold {
            let pending = turn.products()[0].clone();
            info!(
                session_id = %session_id,
                product = %pending,
                confidence = turn.confidence(),
                "Low confidence add, asking for confirmation"
            );
            turn.session.pending_confirmation = Some(pending.clone());
            return Ok(StepResult::reply(format!(
                "¿Querés que te agregue {pending} al pedido?"
            )));
        }
        turn.session.pending_confirmation = None;

        if let Some(entry) = shown_match(turn) {
            let quantity = parse_quantity(&turn.message);
            let reply = services
                .ledger
                .add(&session_id, &entry.name, quantity, entry.sale_price)
                .await?;
            return Ok(StepResult::reply(reply));
        }

        let phrases = turn.products().to_vec();
        let lookups = look_up_phrases(turn, services, &phrases).await;
        if !lookups.hits.is_empty() {
            let listing = services.presenter.present(&turn.message, &lookups.hits).await;
            return Ok(StepResult::reply(listing));
        }
        if lookups.unavailable {
            return Ok(StepResult::reply(CATALOG_DOWN));
        }

        Ok(StepResult::reply(disambiguate(turn, services).await))
    }
}

/// First detected phrase that names a product already shown in this session.
fn shown_match(turn: &Turn) -> Option<CatalogEntry> {
    let by_phrase = turn
        .products()
        .iter()
        .find_map(|phrase| turn.session.find_shown(phrase));
    let by_reference = || {
        turn.shortcut
            .then(|| turn.session.resolve_reference(&turn.message))
            .flatten()
    };
    by_phrase.or_else(by_reference).cloned()
}

async fn disambiguate(turn: &Turn, services: &Services) -> String {
    let prompt = format!(
        "El cliente mencionó '{}'. No estás completamente seguro si se refiere a alguno de los \
         productos mostrados anteriormente. Formulá una pregunta natural y breve para confirmar \
         qué producto desea agregar al pedido.",
        turn.message
    );
    let history = services
        .transcripts
        .last(&turn.session.session_id, services.config.history_window)
        .await
        .unwrap_or_default();

    match services
        .chat_oracle
        .chat(&prompt, &history)
        .await
        .and_then(|raw| clean_reply(&raw))
    {
        Ok(question) => question,
        Err(e) => {
            warn!(session_id = %turn.session.session_id, error = %e, "Disambiguation question failed");
            APOLOGY.to_string()
        }
    }
}
