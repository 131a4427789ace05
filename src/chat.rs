//! The chat-turn engine: message in, applied-or-skipped operations out.
//!
//! This is the immediate-execution call site: the planner's validated batch
//! is applied directly and persisted once at the end, only if something
//! actually changed. Store failures propagate; a failed write must never be
//! reported as a successful mutation.

use crate::error::Error;
use crate::ops::apply::apply_batch;
use crate::ops::{OperationOutcome, OutcomeStatus};
use crate::planner::{ChatMessage, MAX_MESSAGE_CHARS, Planner};
use crate::portfolio::PortfolioDocument;
use crate::portfolio::store::{KeyValueStore, load_portfolio, save_portfolio};

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub reply: String,
    pub operations: Vec<OperationOutcome>,
    pub portfolio: PortfolioDocument,
}

/// Run one chat turn against the stored portfolio.
pub async fn handle_chat_turn(
    planner: &dyn Planner,
    store: &dyn KeyValueStore,
    messages: &[ChatMessage],
) -> Result<ChatTurn, Error> {
    let portfolio = load_portfolio(store).await?;
    let outcome = planner.plan(&portfolio, messages).await;

    let mut assets = portfolio.assets.clone();
    let batch = apply_batch(&mut assets, &outcome.operations);

    let portfolio = if batch.mutated {
        save_portfolio(store, assets).await?
    } else {
        portfolio
    };

    let applied = batch
        .outcomes
        .iter()
        .filter(|outcome| outcome.status == OutcomeStatus::Applied)
        .count();
    tracing::info!(
        applied,
        skipped = batch.outcomes.len() - applied,
        "chat turn settled"
    );

    Ok(ChatTurn {
        reply: outcome.reply,
        operations: batch.outcomes,
        portfolio,
    })
}

/// Reduce untrusted client messages to well-formed chat messages: unknown
/// roles and non-string contents are dropped, contents are capped.
pub fn sanitize_messages(raw: &[serde_json::Value]) -> Vec<ChatMessage> {
    raw.iter()
        .filter_map(|value| {
            let message: ChatMessage = serde_json::from_value(value.clone()).ok()?;
            Some(ChatMessage {
                role: message.role,
                content: message.content.chars().take(MAX_MESSAGE_CHARS).collect(),
            })
        })
        .collect()
}
