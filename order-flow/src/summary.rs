use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::OracleError;
use crate::oracle::{Oracle, clean_reply};
use crate::session::SessionState;
use crate::transcript::{ChatMessage, MessageRole};

const CONTEXT_DISCLAIMER: &str = "IMPORTANTE: estos mensajes son solo referencia conversacional. \
No representan el estado real del pedido: si se menciona que se agregó, quitó o mostró algo, \
no asumas que esos cambios ocurrieron.";

/// Keeps the session's rolling summaries up to date
#[derive(Clone)]
pub struct Summarizer {
    oracle: Arc<dyn Oracle>,
}

impl Summarizer {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Rebuilds both summaries from `recent`. Each one keeps its previous value
    /// when its oracle call fails.
    pub async fn refresh(&self, session: &mut SessionState, recent: &[ChatMessage]) {
        if recent.is_empty() {
            return;
        }
        let transcript = format_transcript(recent);

        match self.ask(&conversation_prompt(&transcript)).await {
            Ok(summary) => session.conversation_summary = summary,
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Conversation summary failed");
            }
        }

        match self.ask(&product_prompt(&transcript)).await {
            Ok(products) => {
                session.product_summary = if products.trim().eq_ignore_ascii_case("NINGUNO") {
                    String::new()
                } else {
                    products
                };
            }
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Product summary failed");
            }
        }

        debug!(
            session_id = %session.session_id,
            product_summary = %session.product_summary,
            "Summaries refreshed"
        );
    }

    async fn ask(&self, prompt: &str) -> Result<String, OracleError> {
        clean_reply(&self.oracle.complete(prompt).await?)
    }
}

fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                MessageRole::User => "cliente",
                MessageRole::Assistant => "bot",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn conversation_prompt(transcript: &str) -> String {
    format!(
        "Estos son los últimos mensajes entre el cliente y el bot.\n\n\
         Generá un resumen claro de lo ocurrido recientemente: qué productos se mencionaron, \
         consultaron, agregaron o quitaron y qué acción realizó el cliente. \
         No incluyas precios ni montos.\n\nMensajes:\n{transcript}\n\n{CONTEXT_DISCLAIMER}"
    )
}

fn product_prompt(transcript: &str) -> String {
    format!(
        "A partir de estos mensajes recientes, listá solo los nombres de los productos mencionados. \
         No incluyas precios, acciones ni saludos. \
         Si no se mencionaron productos, devolvé exactamente la palabra: NINGUNO.\n\n\
         Mensajes:\n{transcript}\n\n{CONTEXT_DISCLAIMER}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct PromptAwareOracle {
        fail_products: bool,
    }

    #[async_trait]
    impl Oracle for PromptAwareOracle {
        async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
            if prompt.starts_with("A partir de") {
                if self.fail_products {
                    return Err(OracleError::Failed("rate limited".into()));
                }
                return Ok("NINGUNO".into());
            }
            Ok("<think>...</think>El cliente saludó.".into())
        }
        async fn chat(&self, _: &str, _: &[ChatMessage]) -> Result<String, OracleError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_refresh_summaries() {
        let summarizer = Summarizer::new(Arc::new(PromptAwareOracle { fail_products: false }));
        let mut session = SessionState::new("s1");
        session.product_summary = "aceite".into();

        summarizer
            .refresh(&mut session, &[ChatMessage::user("hola")])
            .await;
        assert_eq!(session.conversation_summary, "El cliente saludó.");
        assert_eq!(session.product_summary, "");
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_summary() {
        let summarizer = Summarizer::new(Arc::new(PromptAwareOracle { fail_products: true }));
        let mut session = SessionState::new("s1");
        session.product_summary = "aceite marolio".into();

        summarizer
            .refresh(&mut session, &[ChatMessage::user("hola")])
            .await;
        assert_eq!(session.product_summary, "aceite marolio");
    }
}
