use async_trait::async_trait;
use tracing::warn;

use super::{APOLOGY, DialogueState, DialogueStep, Services, StepResult, Turn};
use crate::error::{OracleError, Result};
use crate::oracle::clean_reply;

/// Fallback: the conversational oracle answers with the session's history.
pub struct Conversation;

impl Conversation {
    fn recovery_prompt(message: &str) -> String {
        format!(
            "Hubo un problema interno al procesar el último mensaje del cliente: \"{message}\". \
             Respondé de forma breve y amable, sin inventar productos ni precios, \
             y pedile que lo repita o que te diga qué producto busca."
        )
    }

    async fn ask(turn: &Turn, services: &Services, input: &str) -> std::result::Result<String, OracleError> {
        // A missing history only costs context
        let history = match services
            .transcripts
            .last(&turn.session.session_id, services.config.history_window)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(session_id = %turn.session.session_id, error = %e, "Could not read history");
                Vec::new()
            }
        };
        clean_reply(&services.chat_oracle.chat(input, &history).await?)
    }
}

#[async_trait]
impl DialogueStep for Conversation {
    fn state(&self) -> DialogueState {
        DialogueState::Conversation
    }

    async fn run(&self, turn: &mut Turn, services: &Services) -> Result<StepResult> {
        let input = if turn.recovering {
            Self::recovery_prompt(&turn.message)
        } else {
            turn.message.clone()
        };

        let reply = match Self::ask(turn, services, &input).await {
            Ok(reply) => reply,
            Err(e) if !turn.recovering => {
                warn!(session_id = %turn.session.session_id, error = %e, "Conversation reply failed, retrying once");
                turn.recovering = true;
                match Self::ask(turn, services, &Self::recovery_prompt(&turn.message)).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(session_id = %turn.session.session_id, error = %e, "Recovery reply failed");
                        APOLOGY.to_string()
                    }
                }
            }
            Err(e) => {
                warn!(session_id = %turn.session.session_id, error = %e, "Recovery reply failed");
                APOLOGY.to_string()
            }
        };
        Ok(StepResult::reply(reply))
    }
}
