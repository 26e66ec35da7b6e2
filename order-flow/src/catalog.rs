use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::CatalogError;

/// Read-only projection of a product row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    pub stock: i32,
    pub brand: String,
    pub category: String,
}

/// Result of a catalog lookup that reached the store
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(Vec<CatalogEntry>),
    NotFound(String),
}

impl LookupOutcome {
    pub fn into_entries(self) -> Vec<CatalogEntry> {
        match self {
            LookupOutcome::Found(entries) => entries,
            LookupOutcome::NotFound(_) => Vec::new(),
        }
    }
}

/// Query primitives the lookup rules are built from.
///
/// All comparisons are case-insensitive and every result set is ordered by
/// product name ascending.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Products whose category name equals `category`.
    async fn category_members(&self, category: &str) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Products whose name, brand or category starts with `prefix`.
    async fn prefix_matches(&self, prefix: &str) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Products whose name contains `needle` but does not start with `exclude_prefix`.
    async fn substring_matches(
        &self,
        needle: &str,
        exclude_prefix: &str,
    ) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// Catalog search used by the dialogue: category, then first-word prefix,
/// then full-term substring. The first rule with rows wins.
#[derive(Clone)]
pub struct CatalogLookup {
    store: Arc<dyn CatalogStore>,
}

impl CatalogLookup {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(&self, term: &str) -> Result<LookupOutcome, CatalogError> {
        let normalized = term.trim().to_lowercase();
        let Some(first_word) = normalized.split_whitespace().next() else {
            return Ok(LookupOutcome::NotFound(term.to_string()));
        };

        let result = self.run_rules(&normalized, first_word).await;
        match &result {
            Ok(LookupOutcome::Found(entries)) => {
                info!(term = %normalized, hits = entries.len(), "Catalog lookup found products");
            }
            Ok(LookupOutcome::NotFound(_)) => {
                info!(term = %normalized, catalog_not_found = true, "Catalog lookup found nothing");
            }
            Err(e) => {
                warn!(term = %normalized, catalog_unavailable = true, error = %e, "Catalog lookup failed");
            }
        }
        result.map(|outcome| match outcome {
            LookupOutcome::NotFound(_) => LookupOutcome::NotFound(term.to_string()),
            found => found,
        })
    }

    async fn run_rules(
        &self,
        normalized: &str,
        first_word: &str,
    ) -> Result<LookupOutcome, CatalogError> {
        let by_category = self.store.category_members(normalized).await?;
        if !by_category.is_empty() {
            return Ok(LookupOutcome::Found(by_category));
        }

        let by_prefix = self.store.prefix_matches(first_word).await?;
        if !by_prefix.is_empty() {
            return Ok(LookupOutcome::Found(by_prefix));
        }

        let by_substring = self.store.substring_matches(normalized, first_word).await?;
        if !by_substring.is_empty() {
            return Ok(LookupOutcome::Found(by_substring));
        }

        Ok(LookupOutcome::NotFound(normalized.to_string()))
    }
}

/// Catalog held in memory, loaded from a JSON array or built in code
pub struct InMemoryCatalogStore {
    entries: Vec<CatalogEntry>,
}

impl InMemoryCatalogStore {
    pub fn new(mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Self { entries }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)?;
        info!(
            path = %path.as_ref().display(),
            products = entries.len(),
            "Loaded catalog from file"
        );
        Ok(Self::new(entries))
    }

    fn select(&self, keep: impl Fn(&CatalogEntry) -> bool) -> Vec<CatalogEntry> {
        self.entries.iter().filter(|e| keep(e)).cloned().collect()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn category_members(&self, category: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let category = category.to_lowercase();
        Ok(self.select(|e| e.category.to_lowercase() == category))
    }

    async fn prefix_matches(&self, prefix: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let prefix = prefix.to_lowercase();
        Ok(self.select(|e| {
            e.name.to_lowercase().starts_with(&prefix)
                || e.brand.to_lowercase().starts_with(&prefix)
                || e.category.to_lowercase().starts_with(&prefix)
        }))
    }

    async fn substring_matches(
        &self,
        needle: &str,
        exclude_prefix: &str,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let needle = needle.to_lowercase();
        let exclude_prefix = exclude_prefix.to_lowercase();
        Ok(self.select(|e| {
            let name = e.name.to_lowercase();
            name.contains(&needle) && !name.starts_with(&exclude_prefix)
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn entry(id: i64, name: &str, brand: &str, category: &str, price: i64) -> CatalogEntry {
        CatalogEntry {
            id,
            name: name.to_string(),
            description: None,
            cost_price: Decimal::new(price * 70, 2),
            sale_price: Decimal::new(price, 0),
            stock: 10,
            brand: brand.to_string(),
            category: category.to_string(),
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl CatalogStore for UnreachableStore {
        async fn category_members(&self, _: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
            Err(CatalogError::Unavailable("connection refused".into()))
        }
        async fn prefix_matches(&self, _: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
            Err(CatalogError::Unavailable("connection refused".into()))
        }
        async fn substring_matches(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Vec<CatalogEntry>, CatalogError> {
            Err(CatalogError::Unavailable("connection refused".into()))
        }
    }

    fn names(outcome: LookupOutcome) -> Vec<String> {
        outcome.into_entries().into_iter().map(|e| e.name).collect()
    }

    fn lookup(entries: Vec<CatalogEntry>) -> CatalogLookup {
        CatalogLookup::new(Arc::new(InMemoryCatalogStore::new(entries)))
    }

    #[tokio::test]
    async fn test_category_match_short_circuits() {
        let catalog = lookup(vec![
            entry(1, "Aceite Marolio 900ml", "Marolio", "Aceites", 1500),
            entry(2, "Aceite Cocinero 1.5L", "Cocinero", "Aceites", 2100),
            entry(3, "Aceitunas Nucete", "Nucete", "Conservas", 900),
        ]);

        let outcome = catalog.lookup("ACEITES").await.unwrap();
        assert_eq!(
            names(outcome),
            vec!["Aceite Cocinero 1.5L", "Aceite Marolio 900ml"]
        );
    }

    #[tokio::test]
    async fn test_prefix_rule_on_first_word_matches_name_brand_or_category() {
        let catalog = lookup(vec![
            entry(1, "Aceite Marolio 900ml", "Marolio", "Aceites", 1500),
            entry(2, "Yerba Marolio 1kg", "Marolio", "Infusiones", 2500),
            entry(3, "Fideos Lucchetti", "Lucchetti", "Pastas", 800),
        ]);

        let outcome = catalog.lookup("marolio grande").await.unwrap();
        assert_eq!(
            names(outcome),
            vec!["Aceite Marolio 900ml", "Yerba Marolio 1kg"]
        );
    }

    #[tokio::test]
    async fn test_prefix_takes_precedence_over_substring() {
        let catalog = lookup(vec![
            entry(1, "Oil Marolio 1L", "Marolio", "Oils", 1500),
            entry(2, "Sunflower Oil", "Natura", "Cooking", 1800),
        ]);
        let outcome = catalog.lookup("oil").await.unwrap();
        assert_eq!(names(outcome), vec!["Oil Marolio 1L"]);

        let catalog = lookup(vec![
            entry(2, "Sunflower Oil", "Natura", "Cooking", 1800),
            entry(3, "Olive Oil Extra", "Cocinero", "Cooking", 4000),
        ]);
        let outcome = catalog.lookup("oil").await.unwrap();
        assert_eq!(names(outcome), vec!["Olive Oil Extra", "Sunflower Oil"]);
    }

    #[tokio::test]
    async fn test_not_found_keeps_original_term() {
        let catalog = lookup(vec![entry(1, "Aceite Marolio 900ml", "Marolio", "Aceites", 1500)]);
        let outcome = catalog.lookup("Pizza").await.unwrap();
        assert_eq!(outcome, LookupOutcome::NotFound("Pizza".to_string()));

        let outcome = catalog.lookup("   ").await.unwrap();
        assert!(matches!(outcome, LookupOutcome::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unavailable_store_is_not_not_found() {
        let catalog = CatalogLookup::new(Arc::new(UnreachableStore));
        let result = catalog.lookup("aceite").await;
        assert!(matches!(result, Err(CatalogError::Unavailable(_))));
    }

    #[test]
    fn test_catalog_json_shape() {
        let raw = r#"[{"id": 7, "name": "Arroz Gallo 1kg", "cost_price": "900.50",
            "sale_price": 1250.75, "stock": 3, "brand": "Gallo", "category": "Almacen"}]"#;
        let entries: Vec<CatalogEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[0].sale_price, Decimal::new(125075, 2));
        assert!(entries[0].description.is_none());
    }
}
