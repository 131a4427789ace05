//! Planner adapter: chat history + snapshot → reply and candidate operations.
//!
//! Two interchangeable strategies sit behind the [`Planner`] trait: a
//! model-backed planner delegating to a pluggable text-completion
//! collaborator, and a deterministic pattern-matching fallback that keeps the
//! feature usable when no collaborator is configured or the collaborator
//! fails. Planner failures never fail a chat turn.

mod heuristic;
mod model;

pub use heuristic::HeuristicPlanner;
pub use model::{
    MAX_MESSAGE_CHARS, ModelPlanner, OpenAiCompatibleClient, PromptMessage, PromptRole,
    TextCompletion,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ops::Operation;
use crate::portfolio::PortfolioDocument;

/// One chat message as received from the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A planner's reply plus its shape-validated candidate operations.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerOutcome {
    pub reply: String,
    pub operations: Vec<Operation>,
}

/// Pluggable planning strategy.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        portfolio: &PortfolioDocument,
        messages: &[ChatMessage],
    ) -> PlannerOutcome;
}

/// Model-first planner with the heuristic strategy as fallback.
pub struct PlannerStack {
    model: Option<ModelPlanner>,
    heuristic: HeuristicPlanner,
}

impl PlannerStack {
    pub fn new(model: Option<ModelPlanner>) -> Self {
        Self {
            model,
            heuristic: HeuristicPlanner::new(),
        }
    }

    pub fn heuristic_only() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Planner for PlannerStack {
    async fn plan(
        &self,
        portfolio: &PortfolioDocument,
        messages: &[ChatMessage],
    ) -> PlannerOutcome {
        if let Some(model) = &self.model {
            match model.plan(portfolio, messages).await {
                Ok(outcome) => return outcome,
                Err(error) => {
                    tracing::warn!(%error, "model planner failed, falling back to heuristics");
                }
            }
        }
        self.heuristic.plan_messages(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlannerError;
    use std::sync::Arc;

    struct FailingCompletion;

    #[async_trait]
    impl TextCompletion for FailingCompletion {
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String, PlannerError> {
            Err(PlannerError::RequestFailed {
                provider: "test".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn stack_falls_back_to_heuristics_on_transport_failure() {
        let stack = PlannerStack::new(Some(ModelPlanner::new(Arc::new(FailingCompletion))));
        let outcome = stack
            .plan(
                &PortfolioDocument::empty(),
                &[ChatMessage::user("add 2 gold")],
            )
            .await;
        assert_eq!(outcome.operations.len(), 1);
    }

    #[tokio::test]
    async fn stack_without_model_uses_heuristics() {
        let stack = PlannerStack::heuristic_only();
        let outcome = stack
            .plan(
                &PortfolioDocument::empty(),
                &[ChatMessage::user("remove old wallet")],
            )
            .await;
        assert_eq!(outcome.operations.len(), 1);
    }
}
