use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, warn};

use crate::catalog::{CatalogEntry, CatalogLookup, LookupOutcome};
use crate::oracle::{Oracle, clean_reply};

const NOT_A_DISH: &[&str] = &["NINGUNO", "NINGUNA", "NONE"];

static INGREDIENT_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i),|;|\n|\s+y\s+|\s+and\s+").expect("separator pattern is valid")
});

/// Decomposes prepared dishes ("pizza", "empanadas") into catalog ingredients
#[derive(Clone)]
pub struct DishResolver {
    oracle: Arc<dyn Oracle>,
    catalog: CatalogLookup,
}

impl DishResolver {
    pub fn new(oracle: Arc<dyn Oracle>, catalog: CatalogLookup) -> Self {
        Self { oracle, catalog }
    }

    /// Catalog hits for the dish's ingredients, in ingredient order. `None` when
    /// the phrase is not a dish, the oracle fails, or nothing is in stock.
    pub async fn resolve(&self, phrase: &str) -> Option<Vec<CatalogEntry>> {
        let reply = match self
            .oracle
            .complete(&dish_prompt(phrase))
            .await
            .and_then(|raw| clean_reply(&raw))
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(dish = %phrase, error = %e, "Dish decomposition failed");
                return None;
            }
        };

        let ingredients = parse_ingredients(&reply)?;
        info!(dish = %phrase, ingredients = ?ingredients, "Dish decomposed");

        let mut found = Vec::new();
        for ingredient in &ingredients {
            // Unavailability is already logged by the lookup
            if let Ok(LookupOutcome::Found(entries)) = self.catalog.lookup(ingredient).await {
                found.extend(entries);
            }
        }

        (!found.is_empty()).then_some(found)
    }
}

/// Ingredient names from the oracle's reply, or `None` for the not-a-dish sentinel.
pub fn parse_ingredients(reply: &str) -> Option<Vec<String>> {
    let trimmed = reply
        .trim()
        .trim_matches(|c: char| c == '.' || c == '*' || c == '"')
        .trim();
    if NOT_A_DISH.contains(&trimmed.to_uppercase().as_str()) {
        return None;
    }

    // "pizza → harina, queso" style answers
    let list = trimmed
        .split_once('→')
        .or_else(|| trimmed.split_once("->"))
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);

    let ingredients: Vec<String> = INGREDIENT_SEPARATOR
        .split(list)
        .map(|i| {
            i.trim()
                .trim_start_matches(['-', '•', '*'])
                .trim()
                .trim_end_matches('.')
                .to_lowercase()
        })
        .filter(|i| !i.is_empty())
        .collect();

    (!ingredients.is_empty()).then_some(ingredients)
}

fn dish_prompt(dish: &str) -> String {
    format!(
        r#"Tu tarea es detectar los ingredientes principales necesarios para preparar "{dish}".

No respondas con formato de detección de intención, confianza o productos mencionados.
Solo devolvé los ingredientes, separados por comas.

Si el texto NO se refiere a una comida o plato preparado (por ejemplo, si fuera "jabón" o "aceite de auto"),
respondé exactamente con la palabra: NINGUNO.

Usá términos comunes en Argentina: manteca, porotos, zapallo, choclo, panceta.

Ejemplo de salida válida:
pizza → harina, levadura, queso, salsa de tomate, aceite, sal
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalogStore;
    use crate::catalog::tests::entry;
    use crate::error::OracleError;
    use crate::transcript::ChatMessage;
    use async_trait::async_trait;

    struct FixedOracle(Result<String, OracleError>);

    #[async_trait]
    impl Oracle for FixedOracle {
        async fn complete(&self, _: &str) -> Result<String, OracleError> {
            self.0.clone()
        }
        async fn chat(&self, _: &str, _: &[ChatMessage]) -> Result<String, OracleError> {
            self.0.clone()
        }
    }

    fn resolver(reply: Result<String, OracleError>) -> DishResolver {
        let catalog = CatalogLookup::new(Arc::new(InMemoryCatalogStore::new(vec![
            entry(1, "Harina Pureza 1kg", "Pureza", "Harinas", 900),
            entry(2, "Queso Cremoso La Serenisima", "La Serenisima", "Lacteos", 4200),
            entry(3, "Queso Rallado Sancor", "Sancor", "Lacteos", 1800),
            entry(4, "Levadura Calsa", "Calsa", "Reposteria", 400),
        ])));
        DishResolver::new(Arc::new(FixedOracle(reply)), catalog)
    }

    #[test]
    fn test_parse_ingredients() {
        assert_eq!(parse_ingredients("NINGUNO"), None);
        assert_eq!(parse_ingredients("ninguno."), None);
        assert_eq!(
            parse_ingredients("pizza → Harina, levadura, queso y salsa de tomate"),
            Some(vec![
                "harina".to_string(),
                "levadura".to_string(),
                "queso".to_string(),
                "salsa de tomate".to_string(),
            ])
        );
        assert_eq!(
            parse_ingredients("- flour\n- cheese"),
            Some(vec!["flour".to_string(), "cheese".to_string()])
        );
    }

    #[tokio::test]
    async fn test_resolves_ingredients_in_order_without_dedup() {
        let resolver = resolver(Ok("harina, queso, queso rallado, anchoas".into()));
        let names: Vec<String> = resolver
            .resolve("pizza")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "Harina Pureza 1kg",
                "Queso Cremoso La Serenisima",
                "Queso Rallado Sancor",
                "Queso Cremoso La Serenisima",
                "Queso Rallado Sancor",
            ]
        );
    }

    #[tokio::test]
    async fn test_not_a_dish_or_failure_is_none() {
        assert!(resolver(Ok("NINGUNO".into())).resolve("jabón").await.is_none());
        assert!(resolver(Err(OracleError::Failed("boom".into())))
            .resolve("pizza")
            .await
            .is_none());
        assert!(resolver(Ok("anchoas, alcaparras".into()))
            .resolve("puttanesca")
            .await
            .is_none());
    }
}
