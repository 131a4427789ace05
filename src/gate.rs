//! Human-in-the-loop confirmation gate for tool invocations.
//!
//! Tool calls emitted by the planner land in a conversation as typed message
//! parts. Most tools execute immediately; the portfolio write is sensitive
//! and stays pending until the user answers with one of two fixed sentinel
//! strings, correlated to the invocation by its call id. Resolution state
//! lives in an append-only ledger on the conversation value, so replaying a
//! stream can never execute a write twice.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lookup::{BalanceProvider, PriceProvider, cached_prices, fetch_balance};
use crate::ops::apply::apply_batch;
use crate::ops::{OperationOutcome, OutcomeStatus, parse_operations};
use crate::planner::{ChatMessage, ChatRole};
use crate::portfolio::Chain;
use crate::portfolio::store::{KeyValueStore, load_portfolio, save_portfolio};

/// Sentinel carried by an approval turn.
pub const APPROVE_SENTINEL: &str = "Yes, confirmed.";

/// Sentinel carried by a denial turn.
pub const DENY_SENTINEL: &str = "No, denied.";

/// Fixed tool result recorded for a denied invocation.
pub const DENIED_RESULT: &str = "Error: user denied tool execution.";

/// The closed set of tools the planner may invoke.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    PortfolioRead,
    PortfolioWrite,
    BitcoinBalance,
    EthereumBalance,
    SolanaBalance,
    PriceQuote,
}

impl ToolKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::PortfolioRead => "portfolio.read",
            Self::PortfolioWrite => "portfolio.write",
            Self::BitcoinBalance => "balance.bitcoin",
            Self::EthereumBalance => "balance.ethereum",
            Self::SolanaBalance => "balance.solana",
            Self::PriceQuote => "prices.quote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "portfolio.read" => Some(Self::PortfolioRead),
            "portfolio.write" => Some(Self::PortfolioWrite),
            "balance.bitcoin" => Some(Self::BitcoinBalance),
            "balance.ethereum" => Some(Self::EthereumBalance),
            "balance.solana" => Some(Self::SolanaBalance),
            "prices.quote" => Some(Self::PriceQuote),
            _ => None,
        }
    }

    /// Only portfolio writes need an explicit human approval; everything
    /// else executes as soon as its input is materialized.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, Self::PortfolioWrite)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for ToolKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or(())
    }
}

/// Lifecycle state of one tool invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    AwaitingInput,
    AwaitingApproval,
    Approved,
    Denied,
    Executed,
}

impl InvocationState {
    /// Terminal states are never left; re-processing them is a no-op.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Denied)
    }
}

/// One tool invocation embedded in a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool: ToolKind,
    /// `None` while the planner is still streaming the payload.
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    /// The recorded tool result, written exactly once.
    #[serde(default)]
    pub output: Option<String>,
}

impl ToolInvocation {
    pub fn new(call_id: impl Into<String>, tool: ToolKind, input: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool,
            input: Some(input),
            output: None,
        }
    }
}

/// One part of a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePart {
    Text { content: String },
    ToolCall(ToolInvocation),
}

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    pub role: ChatRole,
    pub parts: Vec<MessagePart>,
}

impl TurnRecord {
    pub fn user_text(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            parts: vec![MessagePart::Text {
                content: content.into(),
            }],
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            parts: vec![MessagePart::Text {
                content: content.into(),
            }],
        }
    }

    pub fn assistant_tool_call(invocation: ToolInvocation) -> Self {
        Self {
            role: ChatRole::Assistant,
            parts: vec![MessagePart::ToolCall(invocation)],
        }
    }

    /// Concatenated text parts of this turn.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { content } => Some(content.as_str()),
                MessagePart::ToolCall(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Append-only resolution record for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub call_id: String,
    pub state: InvocationState,
    pub recorded_at: DateTime<Utc>,
}

/// Explicit, versioned conversation state. Each settlement pass is a state
/// transition over this value; nothing hides in a long-lived agent object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub version: u64,
    pub turns: Vec<TurnRecord>,
    pub ledger: Vec<LedgerEntry>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_turn(&mut self, turn: TurnRecord) {
        self.turns.push(turn);
        self.version += 1;
    }

    /// Latest ledger state for an invocation, if any.
    pub fn invocation_state(&self, call_id: &str) -> Option<InvocationState> {
        self.ledger
            .iter()
            .rev()
            .find(|entry| entry.call_id == call_id)
            .map(|entry| entry.state)
    }

    fn record(&mut self, call_id: &str, state: InvocationState) -> bool {
        if self.invocation_state(call_id) == Some(state) {
            return false;
        }
        self.ledger.push(LedgerEntry {
            call_id: call_id.to_string(),
            state,
            recorded_at: Utc::now(),
        });
        self.version += 1;
        true
    }

    /// Messages safe to send upstream: turns holding an invocation that has
    /// no result and is not terminal are dropped, so the model never reasons
    /// about dangling tool calls.
    pub fn context_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .filter(|turn| !self.turn_has_unsettled(turn))
            .map(|turn| ChatMessage {
                role: turn.role,
                content: turn.text(),
            })
            .collect()
    }

    fn turn_has_unsettled(&self, turn: &TurnRecord) -> bool {
        turn.parts.iter().any(|part| match part {
            MessagePart::ToolCall(invocation) => {
                invocation.output.is_none()
                    && !self
                        .invocation_state(&invocation.call_id)
                        .is_some_and(InvocationState::is_terminal)
            }
            MessagePart::Text { .. } => false,
        })
    }
}

/// An approve/deny answer correlated to an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalSignal {
    pub call_id: String,
    pub approved: bool,
}

impl ApprovalSignal {
    pub fn approve(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            approved: true,
        }
    }

    pub fn deny(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            approved: false,
        }
    }

    /// Interpret a user turn as a confirmation answer for an invocation.
    pub fn from_sentinel(call_id: impl Into<String>, text: &str) -> Option<Self> {
        match text.trim() {
            APPROVE_SENTINEL => Some(Self::approve(call_id)),
            DENY_SENTINEL => Some(Self::deny(call_id)),
            _ => None,
        }
    }
}

/// Executes a tool invocation and renders its result message.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool: ToolKind, input: &serde_json::Value) -> String;
}

/// One state change performed by a settlement pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GateTransition {
    pub call_id: String,
    pub state: InvocationState,
}

/// Settle every tool invocation in the conversation.
///
/// Immediate tools run as soon as their input is materialized. Sensitive
/// tools wait for a matching [`ApprovalSignal`]: approval executes the tool
/// exactly once and records the result; denial records the fixed denied
/// result. Invocations already in a terminal ledger state are skipped, which
/// makes replaying a stream safe.
pub async fn settle_invocations(
    state: &mut ConversationState,
    signals: &[ApprovalSignal],
    executor: &dyn ToolExecutor,
) -> Vec<GateTransition> {
    let mut transitions = Vec::new();

    for turn_index in 0..state.turns.len() {
        for part_index in 0..state.turns[turn_index].parts.len() {
            let (call_id, tool, input) = {
                let MessagePart::ToolCall(invocation) =
                    &state.turns[turn_index].parts[part_index]
                else {
                    continue;
                };
                (
                    invocation.call_id.clone(),
                    invocation.tool,
                    invocation.input.clone(),
                )
            };

            if state
                .invocation_state(&call_id)
                .is_some_and(InvocationState::is_terminal)
            {
                continue;
            }

            let Some(input) = input else {
                if state.record(&call_id, InvocationState::AwaitingInput) {
                    transitions.push(GateTransition {
                        call_id,
                        state: InvocationState::AwaitingInput,
                    });
                }
                continue;
            };

            if !tool.requires_confirmation() {
                let output = executor.execute(tool, &input).await;
                set_output(&mut state.turns[turn_index].parts[part_index], output);
                state.record(&call_id, InvocationState::Executed);
                transitions.push(GateTransition {
                    call_id,
                    state: InvocationState::Executed,
                });
                continue;
            }

            match signals.iter().find(|signal| signal.call_id == call_id) {
                None => {
                    // Left untouched; the caller renders "awaiting confirmation".
                    if state.record(&call_id, InvocationState::AwaitingApproval) {
                        transitions.push(GateTransition {
                            call_id,
                            state: InvocationState::AwaitingApproval,
                        });
                    }
                }
                Some(signal) if signal.approved => {
                    state.record(&call_id, InvocationState::Approved);
                    tracing::info!(call_id = %call_id, tool = %tool, "approved sensitive tool call");
                    let output = executor.execute(tool, &input).await;
                    set_output(&mut state.turns[turn_index].parts[part_index], output);
                    state.record(&call_id, InvocationState::Executed);
                    transitions.push(GateTransition {
                        call_id,
                        state: InvocationState::Executed,
                    });
                }
                Some(_) => {
                    tracing::info!(call_id = %call_id, tool = %tool, "denied sensitive tool call");
                    set_output(
                        &mut state.turns[turn_index].parts[part_index],
                        DENIED_RESULT.to_string(),
                    );
                    state.record(&call_id, InvocationState::Denied);
                    transitions.push(GateTransition {
                        call_id,
                        state: InvocationState::Denied,
                    });
                }
            }
        }
    }

    transitions
}

fn set_output(part: &mut MessagePart, output: String) {
    if let MessagePart::ToolCall(invocation) = part {
        invocation.output = Some(output);
    }
}

/// Tool executor wired to the engine: the portfolio store, the balance
/// provider and the price provider.
pub struct EngineToolExecutor {
    store: Arc<dyn KeyValueStore>,
    balances: Arc<dyn BalanceProvider>,
    prices: Arc<dyn PriceProvider>,
}

impl EngineToolExecutor {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        balances: Arc<dyn BalanceProvider>,
        prices: Arc<dyn PriceProvider>,
    ) -> Self {
        Self {
            store,
            balances,
            prices,
        }
    }

    async fn read_portfolio(&self) -> String {
        match load_portfolio(&*self.store).await {
            Ok(document) => serde_json::to_string(&document)
                .unwrap_or_else(|error| format!("Portfolio read failed: {error}")),
            Err(error) => format!("Portfolio read failed: {error}"),
        }
    }

    async fn write_portfolio(&self, input: &serde_json::Value) -> String {
        let raw = input
            .get("operations")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();
        let operations = parse_operations(&raw);
        if operations.is_empty() {
            return "Portfolio update failed: no valid operations in request.".to_string();
        }

        let portfolio = match load_portfolio(&*self.store).await {
            Ok(document) => document,
            Err(error) => return format!("Portfolio update failed: {error}"),
        };

        let mut assets = portfolio.assets;
        let batch = apply_batch(&mut assets, &operations);
        if batch.mutated
            && let Err(error) = save_portfolio(&*self.store, assets).await
        {
            return format!("Portfolio update failed: {error}");
        }

        summarize_outcomes(&batch.outcomes)
    }

    async fn balance(&self, chain: Chain, input: &serde_json::Value) -> String {
        let Some(address) = input
            .get("address")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|address| !address.is_empty())
        else {
            return "Balance lookup failed: missing wallet address.".to_string();
        };

        let result = fetch_balance(&*self.balances, chain, address).await;
        match result.status {
            crate::lookup::LookupStatus::Ok => format!(
                "Balance of {address}: {} {}",
                result.quantity.normalize(),
                chain.ticker()
            ),
            crate::lookup::LookupStatus::Error => "Balance lookup failed".to_string(),
        }
    }

    async fn quote_prices(&self) -> String {
        let prices = cached_prices(&*self.store, &*self.prices).await;
        serde_json::to_string(&prices).unwrap_or_else(|_| "{}".to_string())
    }
}

fn summarize_outcomes(outcomes: &[OperationOutcome]) -> String {
    let applied = outcomes
        .iter()
        .filter(|outcome| outcome.status == OutcomeStatus::Applied)
        .count();
    let skipped = outcomes.len() - applied;
    format!("Portfolio updated: {applied} applied, {skipped} skipped.")
}

#[async_trait]
impl ToolExecutor for EngineToolExecutor {
    async fn execute(&self, tool: ToolKind, input: &serde_json::Value) -> String {
        match tool {
            ToolKind::PortfolioRead => self.read_portfolio().await,
            ToolKind::PortfolioWrite => self.write_portfolio(input).await,
            ToolKind::BitcoinBalance => self.balance(Chain::Bitcoin, input).await,
            ToolKind::EthereumBalance => self.balance(Chain::Ethereum, input).await,
            ToolKind::SolanaBalance => self.balance(Chain::Solana, input).await,
            ToolKind::PriceQuote => self.quote_prices().await,
        }
    }
}
