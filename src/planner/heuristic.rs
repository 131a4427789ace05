//! Deterministic pattern-matching fallback planner.
//!
//! Keeps the chat feature usable without a model collaborator, at reduced
//! expressiveness. The latest user message is split on sentence-like
//! delimiters and each segment is matched against a small fixed set of
//! phrasings; unmatched segments are dropped.

use std::str::FromStr;

use async_trait::async_trait;
use regex::Regex;
use rust_decimal::Decimal;

use crate::ops::Operation;
use crate::planner::{ChatMessage, ChatRole, Planner, PlannerOutcome};
use crate::portfolio::{Chain, PhysicalSymbol, PortfolioDocument};

const NO_MATCH_REPLY: &str = "I couldn't turn that into portfolio changes. Try \"add bitcoin <address>\", \"add 2 gold\", or \"remove <label>\".";

/// Pattern-matching planner.
#[derive(Debug, Default)]
pub struct HeuristicPlanner;

impl HeuristicPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Plan from the latest user message in the conversation.
    pub fn plan_messages(&self, messages: &[ChatMessage]) -> PlannerOutcome {
        let latest = messages
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::User)
            .map(|message| message.content.as_str())
            .unwrap_or("");
        self.plan_text(latest)
    }

    /// Plan from one free-text message.
    pub fn plan_text(&self, message: &str) -> PlannerOutcome {
        let operations: Vec<Operation> = message
            .split(['.', ';', '\n', '!', '?'])
            .filter_map(|segment| parse_segment(segment.trim()))
            .collect();

        let reply = if operations.is_empty() {
            NO_MATCH_REPLY.to_string()
        } else {
            format!(
                "Planned {} portfolio change(s) from your message.",
                operations.len()
            )
        };

        PlannerOutcome { reply, operations }
    }
}

#[async_trait]
impl Planner for HeuristicPlanner {
    async fn plan(
        &self,
        _portfolio: &PortfolioDocument,
        messages: &[ChatMessage],
    ) -> PlannerOutcome {
        self.plan_messages(messages)
    }
}

fn parse_segment(segment: &str) -> Option<Operation> {
    if segment.is_empty() {
        return None;
    }
    parse_add_chain(segment)
        .or_else(|| parse_add_physical(segment))
        .or_else(|| parse_update(segment))
        .or_else(|| parse_remove(segment))
}

fn parse_add_chain(segment: &str) -> Option<Operation> {
    let pattern = Regex::new(r"(?i)^add\s+(bitcoin|ethereum|solana)\s+(\S+)").ok()?;
    let captures = pattern.captures(segment)?;
    let chain = Chain::parse(captures.get(1)?.as_str())?;
    let token = captures.get(2)?.as_str().to_string();

    // A hex address anywhere in the segment wins over the positional token,
    // so "add ethereum wallet 0xabc..." still picks up the address.
    let address = Regex::new(r"0x[0-9a-fA-F]{8,}")
        .ok()
        .and_then(|hex| hex.find(segment))
        .map(|found| found.as_str().to_string())
        .unwrap_or(token);

    Some(Operation::AddChain {
        chain,
        address,
        label: None,
    })
}

fn parse_add_physical(segment: &str) -> Option<Operation> {
    let pattern = Regex::new(r"(?i)^add\s+([0-9]+(?:\.[0-9]+)?)\s+(gold|usd)\b").ok()?;
    let captures = pattern.captures(segment)?;
    let quantity = Decimal::from_str(captures.get(1)?.as_str()).ok()?;
    let symbol = PhysicalSymbol::parse(captures.get(2)?.as_str())?;

    Some(Operation::AddPhysical {
        symbol,
        quantity,
        label: None,
    })
}

fn parse_update(segment: &str) -> Option<Operation> {
    let pattern = Regex::new(r"(?i)^(?:update|set)\s+(.+?)\s+to\s+([0-9]+(?:\.[0-9]+)?)\s*$").ok()?;
    let captures = pattern.captures(segment)?;
    let identifier = captures.get(1)?.as_str().trim().to_string();
    let quantity = Decimal::from_str(captures.get(2)?.as_str()).ok()?;

    Some(Operation::Update {
        identifier,
        label: None,
        quantity: Some(quantity),
        address: None,
    })
}

fn parse_remove(segment: &str) -> Option<Operation> {
    let pattern = Regex::new(r"(?i)^remove\s+(.+)$").ok()?;
    let captures = pattern.captures(segment)?;
    Some(Operation::Remove {
        identifier: captures.get(1)?.as_str().trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn plan(text: &str) -> PlannerOutcome {
        HeuristicPlanner::new().plan_text(text)
    }

    #[test]
    fn parses_add_chain_with_positional_address() {
        let outcome = plan("add bitcoin bc1qxy2kgdygjrsqtzq2n0yrf2493p");
        assert_eq!(
            outcome.operations,
            vec![Operation::AddChain {
                chain: Chain::Bitcoin,
                address: "bc1qxy2kgdygjrsqtzq2n0yrf2493p".to_string(),
                label: None,
            }]
        );
    }

    #[test]
    fn hex_address_elsewhere_in_segment_wins() {
        let outcome = plan("add ethereum wallet 0xDEADbeef00112233");
        assert_eq!(
            outcome.operations,
            vec![Operation::AddChain {
                chain: Chain::Ethereum,
                address: "0xDEADbeef00112233".to_string(),
                label: None,
            }]
        );
    }

    #[test]
    fn parses_add_physical() {
        let outcome = plan("add 2.5 gold");
        assert_eq!(
            outcome.operations,
            vec![Operation::AddPhysical {
                symbol: PhysicalSymbol::Gold,
                quantity: dec!(2.5),
                label: None,
            }]
        );
    }

    #[test]
    fn parses_remove_with_multiword_identifier() {
        let outcome = plan("remove old bitcoin wallet");
        assert_eq!(
            outcome.operations,
            vec![Operation::Remove {
                identifier: "old bitcoin wallet".to_string(),
            }]
        );
    }

    #[test]
    fn parses_update_and_set_phrasings() {
        let update = plan("update vault gold to 4");
        let set = plan("set vault gold to 4");
        assert_eq!(update.operations, set.operations);
        assert_eq!(
            update.operations,
            vec![Operation::Update {
                identifier: "vault gold".to_string(),
                label: None,
                quantity: Some(dec!(4)),
                address: None,
            }]
        );
    }

    #[test]
    fn splits_segments_and_drops_unmatched_ones() {
        let outcome = plan("add 1 usd. tell me a joke; remove gold");
        assert_eq!(outcome.operations.len(), 2);
        assert_eq!(outcome.reply, "Planned 2 portfolio change(s) from your message.");
    }

    #[test]
    fn unmatched_message_yields_help_reply() {
        let outcome = plan("what is my net worth");
        assert!(outcome.operations.is_empty());
        assert_eq!(outcome.reply, NO_MATCH_REPLY);
    }

    #[test]
    fn latest_user_message_is_used() {
        let planner = HeuristicPlanner::new();
        let outcome = planner.plan_messages(&[
            ChatMessage::user("add 9 usd"),
            ChatMessage::assistant("done"),
            ChatMessage::user("remove usd"),
        ]);
        assert_eq!(
            outcome.operations,
            vec![Operation::Remove {
                identifier: "usd".to_string(),
            }]
        );
    }
}
