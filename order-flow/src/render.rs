use std::sync::Arc;

use tracing::warn;

use crate::catalog::CatalogEntry;
use crate::oracle::{Oracle, clean_reply};

pub const ADD_QUESTION: &str = "¿Cuál querés agregar a tu pedido? 😊";

/// "• {name} — ${price}" per product.
pub fn bullet_list(entries: &[CatalogEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("• {} — ${}", e.name, e.sale_price))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn product_list(entries: &[CatalogEntry]) -> String {
    format!(
        "Tenemos estos productos disponibles:\n\n{}\n\n{ADD_QUESTION}",
        bullet_list(entries)
    )
}

pub fn ingredient_list(dish: &str, entries: &[CatalogEntry]) -> String {
    format!(
        "No tenemos {dish} como producto, pero podés prepararlo con estos ingredientes:\n\n{}\n\n{ADD_QUESTION}",
        bullet_list(entries)
    )
}

/// Presents product lists, optionally phrased by the generation oracle
#[derive(Clone)]
pub struct ProductPresenter {
    oracle: Arc<dyn Oracle>,
    use_oracle: bool,
}

impl ProductPresenter {
    pub fn new(oracle: Arc<dyn Oracle>, use_oracle: bool) -> Self {
        Self { oracle, use_oracle }
    }

    pub async fn present(&self, message: &str, entries: &[CatalogEntry]) -> String {
        let prompt = format!(
            "El cliente preguntó: \"{message}\"\n\
             Estos son los productos encontrados:\n{}\n\n\
             Mostrale la lista con tono amable y natural, usando viñetas (•) y los mismos precios, \
             y preguntale cuál de ellos quiere agregar a su pedido.",
            bullet_list(entries)
        );
        self.phrase(&prompt, || product_list(entries)).await
    }

    pub async fn present_ingredients(&self, dish: &str, entries: &[CatalogEntry]) -> String {
        let prompt = format!(
            "El cliente preguntó por \"{dish}\", pero no lo vendemos como producto.\n\
             Decile amablemente que puede prepararlo con estos ingredientes, en una lista con viñetas (•), \
             y preguntale cuál quiere agregar a su pedido.\n\n{}",
            bullet_list(entries)
        );
        self.phrase(&prompt, || ingredient_list(dish, entries)).await
    }

    async fn phrase(&self, prompt: &str, fallback: impl FnOnce() -> String) -> String {
        if !self.use_oracle {
            return fallback();
        }
        match self.oracle.complete(prompt).await.and_then(|raw| clean_reply(&raw)) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Product list rendering failed, using plain list");
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::entry;
    use crate::error::OracleError;
    use crate::transcript::ChatMessage;
    use async_trait::async_trait;

    struct EmptyOracle;

    #[async_trait]
    impl Oracle for EmptyOracle {
        async fn complete(&self, _: &str) -> Result<String, OracleError> {
            Ok("<think>listing</think>".into())
        }
        async fn chat(&self, _: &str, _: &[ChatMessage]) -> Result<String, OracleError> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_bullet_list() {
        let entries = vec![
            entry(1, "Aceite Cocinero 1.5L", "Cocinero", "Aceites", 2100),
            entry(2, "Aceite Marolio 900ml", "Marolio", "Aceites", 1500),
        ];
        assert_eq!(
            bullet_list(&entries),
            "• Aceite Cocinero 1.5L — $2100\n• Aceite Marolio 900ml — $1500"
        );
        assert!(product_list(&entries).ends_with(ADD_QUESTION));
    }

    #[tokio::test]
    async fn test_empty_oracle_output_falls_back() {
        let entries = vec![entry(1, "Yerba Playadito 1kg", "Playadito", "Yerbas", 2500)];
        let presenter = ProductPresenter::new(Arc::new(EmptyOracle), true);
        assert_eq!(presenter.present("yerba", &entries).await, product_list(&entries));

        let plain = ProductPresenter::new(Arc::new(EmptyOracle), false);
        assert_eq!(
            plain.present_ingredients("mate cocido", &entries).await,
            ingredient_list("mate cocido", &entries)
        );
    }
}
