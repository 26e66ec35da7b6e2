use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FulfillmentError, Result};
use crate::fulfillment::{FinalizedOrder, Fulfillment};
use crate::storage::CartStorage;
use crate::text::phrase_matches;

pub const EMPTY_CART_MESSAGE: &str = "Parece que todavía no tenés productos en tu pedido.";
const CLEAR_EMPTY_MESSAGE: &str = "Todavía no agregaste productos a tu pedido 😕";
const CLEARED_MESSAGE: &str = "Vacié tu pedido. Podés empezar un nuevo pedido cuando quieras. 🧺";
const FINALIZE_EMPTY_MESSAGE: &str = "Todavía no tenés ningún producto en tu pedido 😕";
const FINALIZE_FAILED_MESSAGE: &str =
    "Hubo un problema al enviar el pedido al encargado 😕. Intentá de nuevo más tarde.";
const FINALIZED_MESSAGE: &str =
    "Perfecto 🙌 Tu pedido fue confirmado correctamente y ya está en camino 🚚";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        let mut item = Self {
            name: name.into(),
            quantity,
            unit_price,
            subtotal: Decimal::ZERO,
        };
        item.recompute();
        item
    }

    fn recompute(&mut self) {
        self.subtotal = (self.unit_price * Decimal::from(self.quantity)).round_dp(2);
    }
}

/// One customer's in-progress order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<LineItem>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(|i| i.subtotal).sum()
    }

    /// Adds `quantity` units, merging with an existing line of the same name
    /// (case-insensitive). The unit price of an existing line is kept.
    /// Returns the affected line and whether it is new.
    pub fn add(&mut self, name: &str, quantity: u32, unit_price: Decimal) -> (&LineItem, bool) {
        let quantity = quantity.max(1);
        let position = self
            .items
            .iter()
            .position(|item| item.name.to_lowercase() == name.to_lowercase());

        match position {
            Some(index) => {
                let item = &mut self.items[index];
                item.quantity = item.quantity.saturating_add(quantity);
                item.recompute();
                (&self.items[index], false)
            }
            None => {
                self.items.push(LineItem::new(name, quantity, unit_price));
                let index = self.items.len() - 1;
                (&self.items[index], true)
            }
        }
    }

    /// Removes the first line whose name matches `phrase`.
    pub fn remove_matching(&mut self, phrase: &str) -> Option<LineItem> {
        let index = self
            .items
            .iter()
            .position(|item| phrase_matches(phrase, &item.name))?;
        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// "{name} ${unit}({qty}) : ${subtotal}" per line.
pub fn render_lines(items: &[LineItem]) -> String {
    items
        .iter()
        .map(|i| {
            format!(
                "{} ${:.2}({}) : ${:.2}",
                i.name, i.unit_price, i.quantity, i.subtotal
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of `CartLedger::finalize`
#[derive(Debug)]
pub enum Finalization {
    Confirmed(FinalizedOrder),
    EmptyCart,
    /// The collaborator failed; the cart was kept
    Failed(FulfillmentError),
}

impl Finalization {
    pub fn message(&self) -> &'static str {
        match self {
            Finalization::Confirmed(_) => FINALIZED_MESSAGE,
            Finalization::EmptyCart => FINALIZE_EMPTY_MESSAGE,
            Finalization::Failed(_) => FINALIZE_FAILED_MESSAGE,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Finalization::Confirmed(_))
    }
}

/// Cart operations and their customer-facing replies
#[derive(Clone)]
pub struct CartLedger {
    carts: Arc<dyn CartStorage>,
    fulfillment: Arc<dyn Fulfillment>,
}

impl CartLedger {
    pub fn new(carts: Arc<dyn CartStorage>, fulfillment: Arc<dyn Fulfillment>) -> Self {
        Self { carts, fulfillment }
    }

    pub async fn cart(&self, session_id: &str) -> Result<Cart> {
        self.carts.load(session_id).await
    }

    pub async fn add(
        &self,
        session_id: &str,
        product_name: &str,
        quantity: u32,
        unit_price: Decimal,
    ) -> Result<String> {
        let mut cart = self.carts.load(session_id).await?;
        let (item, is_new) = cart.add(product_name, quantity, unit_price);
        let (name, quantity) = (item.name.clone(), item.quantity);
        let total = cart.total();
        self.carts.store(session_id, cart).await?;

        info!(session_id = %session_id, product = %name, quantity, total = %total, "Cart updated");

        Ok(if is_new {
            format!(
                "🛒 Agregué {name} x{quantity} al pedido. (Total: ${total:.2}), cuando quieras finalizar tu pedido me avisás 😊"
            )
        } else {
            format!("Se actualizaron las unidades de {name} (ahora x{quantity}). Total: ${total:.2}")
        })
    }

    pub async fn show(&self, session_id: &str) -> Result<String> {
        let cart = self.carts.load(session_id).await?;
        if cart.is_empty() {
            return Ok(EMPTY_CART_MESSAGE.to_string());
        }
        Ok(format!(
            "Actualmente tu pedido tiene:\n\n{}\n\n🧾 Total: ${:.2}\n¿Querés agregar algo más o cerrar el pedido?",
            render_lines(&cart.items),
            cart.total()
        ))
    }

    pub async fn clear(&self, session_id: &str) -> Result<String> {
        let mut cart = self.carts.load(session_id).await?;
        if cart.is_empty() {
            return Ok(CLEAR_EMPTY_MESSAGE.to_string());
        }
        cart.clear();
        self.carts.store(session_id, cart).await?;
        info!(session_id = %session_id, "Cart cleared");
        Ok(CLEARED_MESSAGE.to_string())
    }

    pub async fn remove(&self, session_id: &str, product_phrase: &str) -> Result<String> {
        let mut cart = self.carts.load(session_id).await?;
        let Some(removed) = cart.remove_matching(product_phrase) else {
            return Ok(format!(
                "No encontré {product_phrase} en tu pedido. ¿Querés que te muestre lo que tenés hasta ahora?"
            ));
        };
        let total = cart.total();
        self.carts.store(session_id, cart).await?;

        info!(session_id = %session_id, product = %removed.name, "Line removed from cart");
        Ok(format!(
            "Saqué {} de tu pedido. Total: ${total:.2}",
            removed.name
        ))
    }

    /// Emits the order to the fulfillment collaborator and clears the cart.
    /// A failed emission keeps the cart untouched.
    pub async fn finalize(&self, session_id: &str, delivery_details: &str) -> Result<Finalization> {
        let mut cart = self.carts.load(session_id).await?;
        if cart.is_empty() {
            return Ok(Finalization::EmptyCart);
        }

        let order = FinalizedOrder {
            order_id: Uuid::new_v4(),
            customer_id: session_id.to_string(),
            total: cart.total(),
            items: cart.items.clone(),
            delivery_details: delivery_details.trim().to_string(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.fulfillment.emit(&order).await {
            warn!(session_id = %session_id, error = %e, "Order emission failed, cart kept");
            return Ok(Finalization::Failed(e));
        }

        cart.clear();
        self.carts.store(session_id, cart).await?;
        info!(session_id = %session_id, order_id = %order.order_id, "Order finalized");
        Ok(Finalization::Confirmed(order))
    }
}
