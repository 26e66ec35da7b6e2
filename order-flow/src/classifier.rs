use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, warn};

use crate::oracle::{Oracle, clean_reply};
use crate::text::{fold, words};

/// Customer intent detected for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    AddItem,
    RemoveItem,
    ShowCart,
    ClearCart,
    Checkout,
    Chat,
    InfoQuery,
    Other(String),
}

impl Intent {
    /// Parses an oracle token. English and Spanish spellings are accepted.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_uppercase().as_str() {
            "ADD_ITEM" | "AGREGAR_PRODUCTO" => Intent::AddItem,
            "REMOVE_ITEM" | "QUITAR_PRODUCTO" => Intent::RemoveItem,
            "SHOW_CART" | "MOSTRAR_PEDIDO" => Intent::ShowCart,
            "CLEAR_CART" | "VACIAR_PEDIDO" => Intent::ClearCart,
            "CHECKOUT" | "FINALIZAR_PEDIDO" => Intent::Checkout,
            "CHAT" | "CHARLAR" => Intent::Chat,
            "INFO_QUERY" | "CONSULTAR_INFO" => Intent::InfoQuery,
            other => Intent::Other(other.to_string()),
        }
    }

    /// Intents that act on the cart and are remembered across turns.
    pub fn is_cart_affecting(&self) -> bool {
        matches!(
            self,
            Intent::AddItem
                | Intent::RemoveItem
                | Intent::ShowCart
                | Intent::ClearCart
                | Intent::Checkout
        )
    }

    /// Conversational intents that may be replaced by a remembered one.
    pub fn is_soft(&self) -> bool {
        matches!(self, Intent::Chat | Intent::InfoQuery)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::AddItem => write!(f, "ADD_ITEM"),
            Intent::RemoveItem => write!(f, "REMOVE_ITEM"),
            Intent::ShowCart => write!(f, "SHOW_CART"),
            Intent::ClearCart => write!(f, "CLEAR_CART"),
            Intent::Checkout => write!(f, "CHECKOUT"),
            Intent::Chat => write!(f, "CHAT"),
            Intent::InfoQuery => write!(f, "INFO_QUERY"),
            Intent::Other(token) => write!(f, "{token}"),
        }
    }
}

/// Best-effort structured guess extracted from the oracle's reply.
/// Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Option<Intent>,
    pub confidence: Option<u8>,
    pub products: Vec<String>,
}

impl Classification {
    pub fn confident(intent: Intent, confidence: u8, products: Vec<String>) -> Self {
        Self {
            intent: Some(intent),
            confidence: Some(confidence),
            products,
        }
    }

    /// Missing confidence counts as zero.
    pub fn confidence_or_zero(&self) -> u8 {
        self.confidence.unwrap_or(0)
    }
}

/// Session-derived context handed to the classifier
#[derive(Debug, Clone, Default)]
pub struct ClassifierContext {
    pub conversation_summary: String,
    pub product_summary: String,
    pub shown_product_names: Vec<String>,
    pub last_bot_reply: Option<String>,
    pub pending_confirmation: Option<String>,
}

static INTENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*(?:intenci[oó]n|intent)[^:\n]*[:\-]\s*\**\s*([A-Za-z_]+)")
        .expect("intent pattern is valid")
});

static CONFIDENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:confianza|confidence)[^\n\d]*?(\d{1,3})")
        .expect("confidence pattern is valid")
});

static PRODUCTS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*(?:productos?|products?)[^:\n]*:\**(.*)$")
        .expect("products pattern is valid")
});

static PRODUCT_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i),|\n|\s+y\s+|\s+and\s+").expect("separator pattern is valid")
});

const NO_PRODUCTS: &[&str] = &["ninguno", "ninguna", "nada", "none", "n", "no"];

/// Extracts intent, confidence and product phrases from a free-text reply.
/// Fields that are absent or malformed come back as `None` or empty.
pub fn parse_classification(reply: &str) -> Classification {
    let intent = INTENT_LINE
        .captures(reply)
        .map(|caps| Intent::from_token(&caps[1]));

    let confidence = CONFIDENCE_LINE
        .captures(reply)
        .and_then(|caps| caps[1].parse::<u16>().ok())
        .map(|c| c.min(100) as u8);

    let products = PRODUCTS_LINE
        .captures(reply)
        .and_then(|caps| {
            let m = caps.get(0)?;
            let inline = caps[1].trim().to_string();
            if inline.is_empty() {
                Some(bullet_lines(&reply[m.end()..]))
            } else {
                Some(inline)
            }
        })
        .map(|text| split_products(&text))
        .unwrap_or_default();

    Classification {
        intent,
        confidence,
        products,
    }
}

/// Continuation lines written as a bulleted list under the products label.
fn bullet_lines(rest: &str) -> String {
    rest.lines()
        .skip_while(|l| l.trim().is_empty())
        .take_while(|l| {
            let l = l.trim_start();
            l.starts_with('-') || l.starts_with('•') || l.starts_with('*')
        })
        .map(|l| l.trim_start().trim_start_matches(['-', '•', '*']))
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_products(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let tokens = words(&fold(trimmed));
    let is_none = tokens
        .first()
        .is_none_or(|first| tokens.len() <= 2 && NO_PRODUCTS.contains(&first.as_str()));
    if is_none {
        return Vec::new();
    }

    PRODUCT_SEPARATOR
        .split(trimmed)
        .map(|p| {
            p.trim()
                .trim_matches(|c: char| matches!(c, '"' | '\'' | '*' | '.' | '`' | '[' | ']'))
                .trim()
                .to_string()
        })
        .filter(|p| !p.is_empty())
        .collect()
}

const OFFER_PHRASES: &[&str] = &[
    "¿querés agregar",
    "querés agregar",
    "queres agregar",
    "querés que te agregue",
    "cuál querés agregar",
    "would you like to add",
    "which one would you like",
];

const REFERENTIAL_WORDS: &[&str] = &[
    "ese", "esa", "eso", "dale", "agregalo", "agregala", "sumalo", "sumala", "ok", "si", "that",
    "this", "one", "yes", "it",
];

const AFFIRMATIVE_WORDS: &[&str] = &[
    "si", "dale", "ok", "okay", "claro", "bueno", "perfecto", "obvio", "yes", "sure", "yep",
    "agregalo", "agregala", "sumalo",
];

const NEGATIVE_WORDS: &[&str] = &["no", "nah", "nope", "tampoco"];

const SHORT_UTTERANCE_WORDS: usize = 5;

/// Whether every word of the message only points at or agrees with what was
/// offered ("dale", "sí, ese"), with nothing naming a product or a request.
pub fn is_bare_reference(message: &str) -> bool {
    let tokens = words(&fold(message));
    !tokens.is_empty()
        && tokens.iter().all(|t| {
            REFERENTIAL_WORDS.contains(&t.as_str()) || AFFIRMATIVE_WORDS.contains(&t.as_str())
        })
}

/// Outcome of the pre-oracle checks on a message
#[derive(Debug, Clone, PartialEq)]
pub enum ShortcutOutcome {
    /// Classify without calling the oracle
    Classified(Classification),
    /// The customer declined the pending confirmation
    DeclinedPending,
    /// Ask the oracle
    None,
}

/// Wraps the classification oracle
#[derive(Clone)]
pub struct IntentClassifier {
    oracle: Arc<dyn Oracle>,
}

impl IntentClassifier {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Classifies the message. Never fails: an oracle failure yields an empty
    /// classification.
    pub async fn classify(&self, message: &str, context: &ClassifierContext) -> Classification {
        let prompt = build_prompt(message, context);
        match self.oracle.complete(&prompt).await.and_then(|raw| clean_reply(&raw)) {
            Ok(reply) => {
                let classification = parse_classification(&reply);
                info!(
                    intent = ?classification.intent,
                    confidence = ?classification.confidence,
                    products = ?classification.products,
                    "Classified customer message"
                );
                classification
            }
            Err(e) => {
                warn!(error = %e, "Intent classification failed");
                Classification::default()
            }
        }
    }

    /// Resolves short follow-ups ("sí", "ese", "dale") locally so the referent
    /// is not lost by a fresh oracle call.
    pub fn shortcut(&self, message: &str, context: &ClassifierContext) -> ShortcutOutcome {
        let folded = fold(message);
        let tokens = words(&folded);
        if tokens.is_empty() || tokens.len() > SHORT_UTTERANCE_WORDS {
            return ShortcutOutcome::None;
        }

        if let Some(pending) = &context.pending_confirmation {
            if tokens.iter().any(|t| AFFIRMATIVE_WORDS.contains(&t.as_str())) {
                return ShortcutOutcome::Classified(Classification::confident(
                    Intent::AddItem,
                    95,
                    vec![pending.clone()],
                ));
            }
            if tokens.iter().any(|t| NEGATIVE_WORDS.contains(&t.as_str())) {
                return ShortcutOutcome::DeclinedPending;
            }
        }

        let offered = context
            .last_bot_reply
            .as_deref()
            .map(|reply| {
                let reply = reply.to_lowercase();
                OFFER_PHRASES.iter().any(|p| reply.contains(p))
            })
            .unwrap_or(false);

        if offered && tokens.iter().any(|t| REFERENTIAL_WORDS.contains(&t.as_str())) {
            return ShortcutOutcome::Classified(Classification::confident(
                Intent::AddItem,
                95,
                vec![message.trim().to_lowercase()],
            ));
        }

        ShortcutOutcome::None
    }
}

fn build_prompt(message: &str, context: &ClassifierContext) -> String {
    let mut prompt = String::from(
        "Sos el analizador de mensajes de un supermercado que toma pedidos por WhatsApp.\n\n",
    );

    if !context.conversation_summary.is_empty() || !context.product_summary.is_empty() {
        prompt.push_str("Considerá este contexto previo:\n");
        prompt.push_str(&context.conversation_summary);
        prompt.push('\n');
        prompt.push_str(&context.product_summary);
        prompt.push_str("\n\n");
    }

    if !context.shown_product_names.is_empty() {
        prompt.push_str("Estos son los productos que ya se le mostraron al cliente:\n");
        for name in &context.shown_product_names {
            prompt.push_str(&format!("- {name}\n"));
        }
        prompt.push_str(
            "\nSi el producto mencionado no coincide exactamente con los anteriores, \
             devolvé el nombre más parecido entre los productos mostrados. \
             No inventes nombres nuevos.\n\n",
        );
    }

    prompt.push_str(&format!(
        r#"Analizá la nueva frase del cliente:
"{message}"

Respondé SOLO con estas tres líneas:
INTENCION: <una de AGREGAR_PRODUCTO, QUITAR_PRODUCTO, MOSTRAR_PEDIDO, VACIAR_PEDIDO, FINALIZAR_PEDIDO, CONSULTAR_INFO, CHARLAR>
CONFIANZA: <número de 0 a 100>
PRODUCTOS: <productos mencionados separados por comas, o NINGUNO>
"#
    ));
    prompt
}
