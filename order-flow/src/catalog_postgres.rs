use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::catalog::{CatalogEntry, CatalogStore};
use crate::error::CatalogError;

const PRODUCT_SELECT: &str = r#"
SELECT
    p.id::BIGINT AS id,
    p.name,
    p.description,
    p.cost_price,
    p.sale_price,
    p.stock::INT AS stock,
    b.name AS brand,
    c.name AS category
FROM products p
INNER JOIN brands b ON p.brand_id = b.id
INNER JOIN categories c ON p.category_id = c.id
"#;

/// Product catalog backed by the shop's Postgres database
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub async fn connect(database_url: &str) -> Result<Self, CatalogError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(unavailable)?;

        info!("Connected to catalog database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, filter: &str, binds: &[String]) -> Result<Vec<CatalogEntry>, CatalogError> {
        let sql = format!("{PRODUCT_SELECT} WHERE {filter} ORDER BY p.name ASC");
        let mut query = sqlx::query_as::<_, CatalogEntry>(&sql);
        for bind in binds {
            query = query.bind(bind);
        }
        query.fetch_all(&self.pool).await.map_err(unavailable)
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn category_members(&self, category: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.fetch("LOWER(c.name) = $1", &[category.to_lowercase()])
            .await
    }

    async fn prefix_matches(&self, prefix: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
        self.fetch(
            "LOWER(p.name) LIKE $1 OR LOWER(b.name) LIKE $1 OR LOWER(c.name) LIKE $1",
            &[pattern],
        )
        .await
    }

    async fn substring_matches(
        &self,
        needle: &str,
        exclude_prefix: &str,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let contains = format!("%{}%", escape_like(&needle.to_lowercase()));
        let excluded = format!("{}%", escape_like(&exclude_prefix.to_lowercase()));
        self.fetch(
            "LOWER(p.name) LIKE $1 AND LOWER(p.name) NOT LIKE $2",
            &[contains, excluded],
        )
        .await
    }
}

fn unavailable(e: sqlx::Error) -> CatalogError {
    CatalogError::Unavailable(e.to_string())
}

/// Escapes LIKE wildcards so customer text is matched literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("aceite"), "aceite");
        assert_eq!(escape_like("100%_puro"), "100\\%\\_puro");
    }
}
