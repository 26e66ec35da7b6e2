//! Hand-off of confirmed orders to the human operator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::cart::{LineItem, render_lines};
use crate::error::FulfillmentError;

/// An order leaving the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedOrder {
    pub order_id: Uuid,
    pub customer_id: String,
    pub items: Vec<LineItem>,
    pub total: Decimal,
    pub delivery_details: String,
    pub created_at: DateTime<Utc>,
}

impl FinalizedOrder {
    /// Operator-facing notification text.
    pub fn operator_message(&self) -> String {
        format!(
            "🧾 *NUEVO PEDIDO RECIBIDO*\n\n{}\n\n🧾 Total: ${:.2}\n\n📍 *Datos del cliente:* {}\n📞 *WhatsApp:* +{}\n\nPor favor, comuníquese con el cliente para coordinar la entrega. Gracias 🙌",
            render_lines(&self.items),
            self.total,
            self.delivery_details,
            self.customer_id,
        )
    }
}

#[async_trait]
pub trait Fulfillment: Send + Sync {
    async fn emit(&self, order: &FinalizedOrder) -> Result<(), FulfillmentError>;
}

/// Only logs the order. Used when no operator endpoint is configured.
pub struct LogFulfillment;

#[async_trait]
impl Fulfillment for LogFulfillment {
    async fn emit(&self, order: &FinalizedOrder) -> Result<(), FulfillmentError> {
        info!(
            order_id = %order.order_id,
            customer_id = %order.customer_id,
            items = order.items.len(),
            total = %order.total,
            "Order finalized (no fulfillment endpoint configured)"
        );
        Ok(())
    }
}

#[cfg(feature = "http")]
pub use http::HttpFulfillment;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use std::time::Duration;

    #[derive(Serialize)]
    struct OperatorNotification<'a> {
        #[serde(rename = "numero")]
        to: &'a str,
        #[serde(rename = "mensaje")]
        message: String,
        order: &'a FinalizedOrder,
    }

    /// Posts the order to the messaging bridge that notifies the operator
    pub struct HttpFulfillment {
        client: reqwest::Client,
        url: String,
        operator_number: String,
    }

    impl HttpFulfillment {
        pub fn new(
            url: impl Into<String>,
            operator_number: impl Into<String>,
        ) -> Result<Self, FulfillmentError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .map_err(|e| FulfillmentError::Unreachable(e.to_string()))?;
            Ok(Self {
                client,
                url: url.into(),
                operator_number: operator_number.into(),
            })
        }
    }

    #[async_trait]
    impl Fulfillment for HttpFulfillment {
        async fn emit(&self, order: &FinalizedOrder) -> Result<(), FulfillmentError> {
            let payload = OperatorNotification {
                to: &self.operator_number,
                message: order.operator_message(),
                order,
            };

            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| FulfillmentError::Unreachable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FulfillmentError::Rejected {
                    status: status.as_u16(),
                });
            }

            info!(order_id = %order.order_id, "Order sent to operator");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> FinalizedOrder {
        FinalizedOrder {
            order_id: Uuid::new_v4(),
            customer_id: "5491100000000".into(),
            items: vec![LineItem::new("Aceite Marolio 900ml", 2, Decimal::new(1500, 0))],
            total: Decimal::new(3000, 0),
            delivery_details: "Juan Pérez, Av. Siempre Viva 742".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_operator_message() {
        let text = order().operator_message();
        assert!(text.contains("Aceite Marolio 900ml $1500.00(2) : $3000.00"));
        assert!(text.contains("Juan Pérez, Av. Siempre Viva 742"));
        assert!(text.contains("+5491100000000"));
    }

    #[cfg(feature = "http")]
    mod over_http {
        use super::*;
        use crate::error::FulfillmentError;
        use crate::fulfillment::HttpFulfillment;
        use axum::{Json, Router, http::StatusCode, routing::post};
        use serde_json::Value;
        use std::sync::{Arc, Mutex};

        /// Operator bridge stand-in answering every notification with `status`
        async fn bridge(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
            let received = Arc::new(Mutex::new(Vec::new()));
            let sink = received.clone();
            let app = Router::new().route(
                "/send",
                post(move |Json(body): Json<Value>| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().unwrap().push(body);
                        status
                    }
                }),
            );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (format!("http://{addr}/send"), received)
        }

        #[tokio::test]
        async fn test_posts_operator_notification() {
            let (url, received) = bridge(StatusCode::OK).await;
            let fulfillment = HttpFulfillment::new(url, "5491199999999").unwrap();
            let order = order();

            fulfillment.emit(&order).await.unwrap();

            let received = received.lock().unwrap();
            assert_eq!(received.len(), 1);
            let payload = &received[0];
            assert_eq!(payload["numero"], "5491199999999");
            assert_eq!(payload["mensaje"], order.operator_message());
            assert_eq!(payload["order"]["customer_id"], "5491100000000");
            assert_eq!(payload["order"]["order_id"], order.order_id.to_string());
            assert_eq!(payload["order"]["items"][0]["name"], "Aceite Marolio 900ml");
        }

        #[tokio::test]
        async fn test_non_success_status_is_rejected() {
            let (url, received) = bridge(StatusCode::BAD_GATEWAY).await;
            let fulfillment = HttpFulfillment::new(url, "5491199999999").unwrap();

            let err = fulfillment.emit(&order()).await.unwrap_err();
            assert!(matches!(err, FulfillmentError::Rejected { status: 502 }));
            assert_eq!(received.lock().unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_unreachable_bridge() {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);
            let fulfillment =
                HttpFulfillment::new(format!("http://{addr}/send"), "5491199999999").unwrap();

            let err = fulfillment.emit(&order()).await.unwrap_err();
            assert!(matches!(err, FulfillmentError::Unreachable(_)));
        }
    }
}
