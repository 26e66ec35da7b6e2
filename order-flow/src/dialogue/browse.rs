use async_trait::async_trait;
use tracing::info;

use super::{CATALOG_DOWN, DialogueState, DialogueStep, Services, StepResult, Turn};
use crate::catalog::{CatalogEntry, LookupOutcome};
use crate::error::Result;

/// Catalog results for a set of product phrases
#[derive(Debug, Default)]
pub(super) struct Lookups {
    pub hits: Vec<CatalogEntry>,
    pub missing: Vec<String>,
    pub unavailable: bool,
}

/// Looks up every phrase, remembering each hit list as shown.
pub(super) async fn look_up_phrases(turn: &mut Turn, services: &Services, phrases: &[String]) -> Lookups {
    let mut lookups = Lookups::default();
    for phrase in phrases {
        match services.catalog.lookup(phrase).await {
            Ok(LookupOutcome::Found(entries)) => {
                turn.session.remember_shown(
                    phrase,
                    entries.clone(),
                    services.config.max_shown_terms,
                );
                lookups.hits.extend(entries);
            }
            Ok(LookupOutcome::NotFound(term)) => lookups.missing.push(term),
            // Logged by the lookup; answered as "not found right now"
            Err(_) => lookups.unavailable = true,
        }
    }
    lookups
}

/// Product phrases without an actionable intent: list what the catalog has,
/// trying dish decomposition for phrases it does not know.
pub struct ProductMention;

#[async_trait]
impl DialogueStep for ProductMention {
    fn state(&self) -> DialogueState {
        DialogueState::ProductMention
    }

    async fn run(&self, turn: &mut Turn, services: &Services) -> Result<StepResult> {
        if turn.products().is_empty() {
            return Ok(StepResult::pass());
        }

        let phrases = turn.products().to_vec();
        let mut lookups = look_up_phrases(turn, services, &phrases).await;

        let mut dish: Option<(String, Vec<CatalogEntry>)> = None;
        if !lookups.unavailable {
            for missing in &lookups.missing {
                if let Some(ingredients) = services.dishes.resolve(missing).await {
                    turn.session.remember_shown(
                        missing,
                        ingredients.clone(),
                        services.config.max_shown_terms,
                    );
                    // Only the first dish gets its own framing
                    if dish.is_some() {
                        lookups.hits.extend(ingredients);
                    } else {
                        dish = Some((missing.clone(), ingredients));
                    }
                }
            }
        }

        info!(
            session_id = %turn.session.session_id,
            hits = lookups.hits.len(),
            missing = ?lookups.missing,
            dish = ?dish.as_ref().map(|(name, _)| name),
            "Product mention resolved"
        );

        let reply = match dish {
            Some((name, ingredients)) if lookups.hits.is_empty() => {
                services.presenter.present_ingredients(&name, &ingredients).await
            }
            Some((_, ingredients)) => {
                lookups.hits.extend(ingredients);
                services.presenter.present(&turn.message, &lookups.hits).await
            }
            None if !lookups.hits.is_empty() => {
                services.presenter.present(&turn.message, &lookups.hits).await
            }
            None if lookups.unavailable => CATALOG_DOWN.to_string(),
            None => format!(
                "Lamentablemente no tenemos {} en este momento. ¿Querés consultar otro producto?",
                lookups.missing.join(", ")
            ),
        };
        Ok(StepResult::reply(reply))
    }
}
