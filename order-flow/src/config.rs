use serde::{Deserialize, Serialize};

/// Tunables of the dialogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Minimum confidence to add without asking.
    pub add_threshold: u8,
    pub show_cart_threshold: u8,
    /// Minimum confidence to remove a line or empty the cart.
    pub clear_threshold: u8,
    /// Transcript entries handed to the conversational oracle.
    pub history_window: usize,
    /// Transcript entries the rolling summaries are built from.
    pub summary_window: usize,
    pub summaries_enabled: bool,
    /// Let the generation oracle phrase product lists.
    pub oracle_rendering: bool,
    /// Cap on remembered shown-product terms. `None` keeps all of them.
    pub max_shown_terms: Option<usize>,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            add_threshold: 90,
            show_cart_threshold: 70,
            clear_threshold: 90,
            history_window: 20,
            summary_window: 12,
            summaries_enabled: true,
            oracle_rendering: true,
            max_shown_terms: None,
        }
    }
}
