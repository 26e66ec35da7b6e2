mod chat_bridge;
mod config;
mod llm;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use order_flow::{
    CartLedger, CatalogLookup, CatalogStore, FileTranscriptStore, Fulfillment, HttpFulfillment,
    InMemoryCartStorage, InMemoryCatalogStore, InMemorySessionStorage, InMemoryTranscriptStore,
    IntentClassifier, LogFulfillment, Oracle, PostgresCatalogStore, Services, Summarizer,
    TimeoutOracle, TranscriptStore, TurnRunner, default_dialogue,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::llm::{CHAT_PREAMBLE, CLASSIFIER_PREAMBLE, RigOracle};

#[derive(Clone)]
struct AppState {
    runner: TurnRunner,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    from: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct ReplyResponse {
    status: String,
    session_id: String,
    response: String,
}

/// Initialize tracing; `pretty` for development, JSON lines otherwise
fn init_tracing(log_format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "order_assistant_service=debug,order_flow=debug,tower_http=debug".into()
    });

    match log_format {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.log_format);

    let runner = build_runner(&config).await?;
    let app = build_router(AppState { runner });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_runner(config: &AppConfig) -> anyhow::Result<TurnRunner> {
    let classification_oracle: Arc<dyn Oracle> = Arc::new(TimeoutOracle::new(
        Arc::new(RigOracle::new(
            &config.openrouter_api_key,
            &config.classifier_model,
            CLASSIFIER_PREAMBLE,
        )),
        config.oracle_timeout,
    ));
    let chat_oracle: Arc<dyn Oracle> = Arc::new(TimeoutOracle::new(
        Arc::new(RigOracle::new(
            &config.openrouter_api_key,
            &config.chat_model,
            CHAT_PREAMBLE,
        )),
        config.oracle_timeout,
    ));

    let catalog = CatalogLookup::new(create_catalog_store(config).await?);
    let ledger = CartLedger::new(
        Arc::new(InMemoryCartStorage::new()),
        create_fulfillment(config)?,
    );
    let transcripts = create_transcript_store(config).await?;

    let services = Services::new(
        catalog,
        ledger,
        classification_oracle.clone(),
        chat_oracle.clone(),
        transcripts,
        config.dialogue.clone(),
    );

    Ok(TurnRunner::new(
        Arc::new(default_dialogue()),
        Arc::new(services),
        Arc::new(InMemorySessionStorage::new()),
        IntentClassifier::new(classification_oracle),
    )
    .with_summarizer(Summarizer::new(chat_oracle)))
}

async fn create_catalog_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CatalogStore>> {
    if let Some(database_url) = &config.database_url {
        info!("Using PostgreSQL catalog");
        match PostgresCatalogStore::connect(database_url).await {
            Ok(store) => return Ok(Arc::new(store)),
            Err(e) => error!(
                "Failed to connect to PostgreSQL: {}. Falling back to the file catalog.",
                e
            ),
        }
    }

    match &config.catalog_file {
        Some(path) => Ok(Arc::new(InMemoryCatalogStore::from_json_file(path)?)),
        None => {
            warn!("No catalog configured (set DATABASE_URL or CATALOG_FILE); every lookup will be empty");
            Ok(Arc::new(InMemoryCatalogStore::new(Vec::new())))
        }
    }
}

fn create_fulfillment(config: &AppConfig) -> anyhow::Result<Arc<dyn Fulfillment>> {
    match &config.fulfillment_url {
        Some(url) => {
            info!(url = %url, "Orders will be sent to the operator bridge");
            Ok(Arc::new(HttpFulfillment::new(
                url.clone(),
                config.operator_number.clone(),
            )?))
        }
        None => {
            info!("Orders will only be logged (set FULFILLMENT_URL to notify the operator)");
            Ok(Arc::new(LogFulfillment))
        }
    }
}

async fn create_transcript_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TranscriptStore>> {
    match &config.transcript_dir {
        Some(dir) => {
            info!(dir = %dir, "Writing transcripts to disk");
            Ok(Arc::new(FileTranscriptStore::new(dir.clone()).await?))
        }
        None => Ok(Arc::new(InMemoryTranscriptStore::new())),
    }
}

fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/process-message", post(process_message))
        .route("/session/{id}", get(get_session))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Derives the session id from a messaging-platform sender address.
fn normalize_session_id(from: &str) -> String {
    let id = from.trim();
    let id = id.strip_prefix("whatsapp:").unwrap_or(id);
    let id = id.strip_suffix("@c.us").unwrap_or(id);
    id.replace('+', "").trim().to_string()
}

async fn health_check() -> &'static str {
    "OK"
}

async fn process_message(
    State(state): State<AppState>,
    Json(request): Json<InboundMessage>,
) -> Result<Json<ReplyResponse>, StatusCode> {
    let session_id = normalize_session_id(&request.from);
    if session_id.is_empty() {
        warn!(from = %request.from, "Rejected message without a sender");
        return Err(StatusCode::BAD_REQUEST);
    }

    info!(
        session_id = %session_id,
        content_length = %request.body.len(),
        "Processing inbound message"
    );

    let response = state.runner.respond(&session_id, &request.body).await;

    Ok(Json(ReplyResponse {
        status: "ok".to_string(),
        session_id,
        response,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let session_id = normalize_session_id(&session_id);

    match state.runner.snapshot(&session_id).await {
        Ok(Some((session, cart))) => Ok(Json(json!({
            "session": session,
            "cart": {
                "items": cart.items,
                "total": cart.total(),
            },
        }))),
        Ok(None) => {
            info!(session_id = %session_id, "Session not found");
            Err(StatusCode::NOT_FOUND)
        }
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to get session");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use order_flow::{ChatMessage, DialogueConfig, OracleError, dialogue::APOLOGY};
    use tower::ServiceExt;

    struct Unreachable;

    #[async_trait]
    impl Oracle for Unreachable {
        async fn complete(&self, _: &str) -> Result<String, OracleError> {
            Err(OracleError::Failed("offline".into()))
        }
        async fn chat(&self, _: &str, _: &[ChatMessage]) -> Result<String, OracleError> {
            Err(OracleError::Failed("offline".into()))
        }
    }

    fn offline_app() -> Router {
        let oracle: Arc<dyn Oracle> = Arc::new(Unreachable);
        let services = Services::new(
            CatalogLookup::new(Arc::new(InMemoryCatalogStore::new(Vec::new()))),
            CartLedger::new(Arc::new(InMemoryCartStorage::new()), Arc::new(LogFulfillment)),
            oracle.clone(),
            oracle.clone(),
            Arc::new(InMemoryTranscriptStore::new()),
            DialogueConfig::default(),
        );
        let runner = TurnRunner::new(
            Arc::new(default_dialogue()),
            Arc::new(services),
            Arc::new(InMemorySessionStorage::new()),
            IntentClassifier::new(oracle),
        );
        build_router(AppState { runner })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_normalize_session_id() {
        assert_eq!(normalize_session_id("whatsapp:+5491122334455"), "5491122334455");
        assert_eq!(normalize_session_id("5491122334455@c.us"), "5491122334455");
        assert_eq!(normalize_session_id(" +54 9 11 "), "54 9 11");
        assert_eq!(normalize_session_id("whatsapp:"), "");
    }

    #[tokio::test]
    async fn test_process_message_answers_even_when_oracle_is_down() {
        let app = offline_app();
        let request = Request::post("/process-message")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"from": "whatsapp:+5491100000000", "body": "hola"}).to_string(),
            ))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["session_id"], "5491100000000");
        assert_eq!(body["response"], APOLOGY);

        let response = app
            .oneshot(
                Request::get("/session/5491100000000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["session"]["session_id"], "5491100000000");
        assert!(body["cart"]["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let response = offline_app()
            .oneshot(Request::get("/session/nobody").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_message_without_sender_is_rejected() {
        let request = Request::post("/process-message")
            .header("content-type", "application/json")
            .body(Body::from(json!({"from": "  ", "body": "hola"}).to_string()))
            .unwrap();
        let response = offline_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let response = offline_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
