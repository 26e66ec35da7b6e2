use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogEntry;
use crate::classifier::{Intent, is_bare_reference};
use crate::text::{fold, phrase_matches, words};

/// Catalog rows returned for one query term and shown to the customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShownProducts {
    pub term: String,
    pub entries: Vec<CatalogEntry>,
}

/// Per-customer conversation state. The cart lives in its own store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Ordered oldest to newest. Re-showing a term moves it to the end.
    pub shown_products: Vec<ShownProducts>,
    pub last_valid_intent: Option<Intent>,
    pub last_detected_product: Option<String>,
    pub pending_confirmation: Option<String>,
    pub awaiting_customer_details: bool,
    pub conversation_summary: String,
    pub product_summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            shown_products: Vec::new(),
            last_valid_intent: None,
            last_detected_product: None,
            pending_confirmation: None,
            awaiting_customer_details: false,
            conversation_summary: String::new(),
            product_summary: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records the rows shown for `term`, replacing an earlier showing of the
    /// same term. With `max_terms` set, the oldest terms are evicted first.
    pub fn remember_shown(
        &mut self,
        term: &str,
        entries: Vec<CatalogEntry>,
        max_terms: Option<usize>,
    ) {
        let term = term.trim().to_lowercase();
        self.shown_products.retain(|shown| shown.term != term);
        self.shown_products.push(ShownProducts { term, entries });

        if let Some(max) = max_terms {
            let excess = self.shown_products.len().saturating_sub(max.max(1));
            self.shown_products.drain(..excess);
        }
    }

    /// First previously shown product whose name matches `phrase`, searching
    /// the most recent showing first.
    pub fn find_shown(&self, phrase: &str) -> Option<&CatalogEntry> {
        self.shown_products
            .iter()
            .rev()
            .flat_map(|shown| shown.entries.iter())
            .find(|entry| phrase_matches(phrase, &entry.name))
    }

    /// Product a short referential reply ("ese", "dale, el marolio") points at,
    /// taken from the most recent showing. A bare reference to a
    /// single-product showing is the referent outright; otherwise a
    /// distinctive word of the reply has to appear in exactly one shown name.
    pub fn resolve_reference(&self, message: &str) -> Option<&CatalogEntry> {
        let latest = self.shown_products.last()?;
        if let [only] = latest.entries.as_slice() {
            if is_bare_reference(message) {
                return Some(only);
            }
        }

        let folded = fold(message);
        let mut candidates = latest.entries.iter().filter(|entry| {
            let name = words(&fold(&entry.name));
            words(&folded)
                .iter()
                .any(|w| w.chars().count() >= 4 && name.contains(w))
        });
        match (candidates.next(), candidates.next()) {
            (Some(entry), None) => Some(entry),
            _ => None,
        }
    }

    /// Distinct names of every product shown so far, oldest first.
    pub fn shown_product_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entry in self.shown_products.iter().flat_map(|s| s.entries.iter()) {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&entry.name)) {
                names.push(entry.name.clone());
            }
        }
        names
    }

    /// Returns the dialogue to idle after a completed order.
    pub fn reset_to_idle(&mut self) {
        self.awaiting_customer_details = false;
        self.last_valid_intent = None;
        self.last_detected_product = None;
        self.pending_confirmation = None;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
