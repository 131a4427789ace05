//! Thin HTTP surface over the engine.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::chat::{handle_chat_turn, sanitize_messages};
use crate::error::Error;
use crate::lookup::{BalanceProvider, PriceProvider};
use crate::ops::OperationOutcome;
use crate::planner::Planner;
use crate::portfolio::store::KeyValueStore;
use crate::summary::{PortfolioSummary, build_summary};

/// Shared handles behind every route.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub planner: Arc<dyn Planner>,
    pub balances: Arc<dyn BalanceProvider>,
    pub prices: Arc<dyn PriceProvider>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/portfolio", get(portfolio_summary))
        .route("/api/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn portfolio_summary(
    State(state): State<AppState>,
) -> Result<Json<PortfolioSummary>, ApiError> {
    let summary = build_summary(&*state.store, &*state.balances, &*state.prices)
        .await
        .map_err(Error::from)?;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    reply: String,
    operations: Vec<OperationOutcome>,
    summary: PortfolioSummary,
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let messages = sanitize_messages(&request.messages);
    let turn = handle_chat_turn(&*state.planner, &*state.store, &messages).await?;
    let summary = build_summary(&*state.store, &*state.balances, &*state.prices)
        .await
        .map_err(Error::from)?;

    Ok(Json(ChatResponse {
        reply: turn.reply,
        operations: turn.operations,
        summary,
    }))
}

/// JSON error envelope for the API routes.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::lookup::CryptoPrices;
    use crate::planner::PlannerStack;
    use crate::portfolio::store::MemoryStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    struct ZeroBalances;

    #[async_trait]
    impl BalanceProvider for ZeroBalances {
        async fn native_balance(
            &self,
            _chain: crate::portfolio::Chain,
            _address: &str,
        ) -> Result<Decimal, LookupError> {
            Ok(Decimal::ZERO)
        }
    }

    struct StaticPrices;

    #[async_trait]
    impl PriceProvider for StaticPrices {
        async fn crypto_prices(&self) -> Result<CryptoPrices, LookupError> {
            Ok(CryptoPrices {
                btc: dec!(60000),
                eth: dec!(3000),
                sol: dec!(150),
            })
        }

        async fn gold_price(&self) -> Result<Decimal, LookupError> {
            Ok(dec!(2400))
        }
    }

    fn test_state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            planner: Arc::new(PlannerStack::heuristic_only()),
            balances: Arc::new(ZeroBalances),
            prices: Arc::new(StaticPrices),
        }
    }

    #[tokio::test]
    async fn chat_route_applies_operations_and_returns_summary() {
        let state = test_state();
        let request = ChatRequest {
            messages: vec![json!({"role": "user", "content": "add 2 gold"})],
        };

        let Json(response) = chat(State(state.clone()), Json(request)).await.unwrap();
        assert_eq!(response.operations.len(), 1);
        assert_eq!(response.summary.assets.len(), 1);
        assert_eq!(response.summary.assets[0].usd_value, dec!(4800));
    }

    #[tokio::test]
    async fn portfolio_route_renders_empty_summary() {
        let Json(summary) = portfolio_summary(State(test_state())).await.unwrap();
        assert!(summary.assets.is_empty());
        assert_eq!(summary.totals.usd, Decimal::ZERO);
    }
}
