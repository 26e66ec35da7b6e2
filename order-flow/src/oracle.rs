//! The language-model boundary.
//!
//! Replies are untyped free text. Callers parse them defensively and treat any
//! error as a local failure with a fixed fallback.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::error::OracleError;
use crate::transcript::ChatMessage;

#[async_trait]
pub trait Oracle: Send + Sync {
    /// One-shot prompt without history.
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;

    /// Prompt continuing a conversation.
    async fn chat(&self, message: &str, history: &[ChatMessage]) -> Result<String, OracleError>;
}

/// Imposes a deadline on every call of the wrapped oracle
pub struct TimeoutOracle {
    inner: Arc<dyn Oracle>,
    timeout: Duration,
}

impl TimeoutOracle {
    pub fn new(inner: Arc<dyn Oracle>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl Oracle for TimeoutOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        tokio::time::timeout(self.timeout, self.inner.complete(prompt))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))?
    }

    async fn chat(&self, message: &str, history: &[ChatMessage]) -> Result<String, OracleError> {
        tokio::time::timeout(self.timeout, self.inner.chat(message, history))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))?
    }
}

static REASONING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think>.*?</think>").expect("reasoning pattern is valid")
});

/// Removes `<think>` blocks and surrounding whitespace from a reply.
pub fn clean_reply(raw: &str) -> Result<String, OracleError> {
    let cleaned = REASONING.replace_all(raw, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(OracleError::EmptyReply);
    }
    Ok(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowOracle;

    #[async_trait]
    impl Oracle for SlowOracle {
        async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }

        async fn chat(&self, _: &str, _: &[ChatMessage]) -> Result<String, OracleError> {
            Ok("fast".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_an_oracle_failure() {
        let oracle = TimeoutOracle::new(Arc::new(SlowOracle), Duration::from_secs(5));
        let result = oracle.complete("hola").await;
        assert!(matches!(result, Err(OracleError::Timeout(_))));

        let reply = oracle.chat("hola", &[]).await.unwrap();
        assert_eq!(reply, "fast");
    }

    #[test]
    fn test_clean_reply_strips_reasoning() {
        let raw = "<think>\nthe user wants oil\n</think>\n  INTENCION: AGREGAR_PRODUCTO ";
        assert_eq!(clean_reply(raw).unwrap(), "INTENCION: AGREGAR_PRODUCTO");
        assert!(matches!(
            clean_reply("<THINK>x</THINK>   "),
            Err(OracleError::EmptyReply)
        ));
    }
}
