use async_trait::async_trait;
use order_flow::{ChatMessage, Oracle, OracleError};
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::{Chat, Prompt},
    providers::openrouter,
};
use tracing::debug;

use crate::chat_bridge::to_rig_messages;

/// Instructions for the oracle that classifies messages and splits dishes
/// into ingredients. Its replies are parsed, so it must stay terse.
pub const CLASSIFIER_PREAMBLE: &str = "Sos un analizador de mensajes para un almacén que toma pedidos por chat. \
Respondé exactamente en el formato que se te pide, sin saludos ni explicaciones.";

/// Persona of the conversational oracle.
pub const CHAT_PREAMBLE: &str = "Sos el asistente de un almacén que toma pedidos por WhatsApp. \
Respondé en español rioplatense, de forma breve, clara y amable. \
No inventes productos, precios ni stock: si no sabés algo, ofrecé buscarlo. \
Para agregar productos al pedido el cliente tiene que nombrarlos.";

/// Oracle backed by an OpenRouter model through rig
pub struct RigOracle {
    agent: Agent<openrouter::CompletionModel>,
    model: String,
}

impl RigOracle {
    pub fn new(api_key: &str, model: &str, preamble: &str) -> Self {
        let client = openrouter::Client::new(api_key);
        let agent = client.agent(model).preamble(preamble).build();
        Self {
            agent,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Oracle for RigOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        debug!(model = %self.model, prompt_length = prompt.len(), "Prompting oracle");
        self.agent
            .prompt(prompt)
            .await
            .map_err(|e| OracleError::Failed(e.to_string()))
    }

    async fn chat(&self, message: &str, history: &[ChatMessage]) -> Result<String, OracleError> {
        debug!(model = %self.model, history = history.len(), "Chatting with oracle");
        self.agent
            .chat(message, to_rig_messages(history))
            .await
            .map_err(|e| OracleError::Failed(e.to_string()))
    }
}
