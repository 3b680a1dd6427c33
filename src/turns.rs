// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Splitting an export into turns.
//!
//! Every request in the export is one exchange, numbered from 1. When the
//! user only typed "Continue" (or Copilot's agent-mode iterate prompt), the
//! exchange belongs to the work of the previous one, so it is folded into
//! the previous turn and the turn's label becomes a range like `5-6`.

use crate::parser::ChatExport;
use crate::stream::{Block, Processor};

/// Marker Copilot's agent mode sends when the user clicks "Continue".
const AGENT_CONTINUE_MARKER: &str = r#"@agent Continue: "Continue to iterate?""#;

/// One request and its processed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// 1-based position in the export.
    pub ordinal: usize,
    /// The user's message.
    pub request_text: String,
    /// Unix timestamp in milliseconds of the request.
    pub timestamp: i64,
    /// Model that produced the response.
    pub model_id: Option<String>,
    /// The response, in item order.
    pub blocks: Vec<Block>,
}

/// A unit of output: an opening exchange plus any continuations folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    exchanges: Vec<Exchange>,
}

impl Turn {
    fn new(first: Exchange) -> Self {
        Self {
            exchanges: vec![first],
        }
    }

    /// The exchanges in this turn, opener first.
    #[must_use]
    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    /// Ordinal of the opening exchange.
    #[must_use]
    pub fn first_ordinal(&self) -> usize {
        self.exchanges[0].ordinal
    }

    /// Ordinal of the last absorbed exchange.
    #[must_use]
    pub fn last_ordinal(&self) -> usize {
        self.exchanges[self.exchanges.len() - 1].ordinal
    }

    /// Whether continuation exchanges were folded in.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.exchanges.len() > 1
    }

    /// `N` for a single exchange, `N-M` for a merged range.
    #[must_use]
    pub fn label(&self) -> String {
        if self.is_merged() {
            format!("{}-{}", self.first_ordinal(), self.last_ordinal())
        } else {
            self.first_ordinal().to_string()
        }
    }

    /// All blocks of the turn, exchange by exchange.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.exchanges.iter().flat_map(|e| e.blocks.iter())
    }
}

/// Returns `true` when `text` only asks the assistant to keep going.
///
/// Matches `continue` exactly (ignoring case and surrounding whitespace) or
/// Copilot's agent-mode iterate marker. Variants such as `continue.` or
/// `please continue` are ordinary requests.
#[must_use]
pub fn is_continuation(text: &str) -> bool {
    let text = text.trim();
    text.eq_ignore_ascii_case("continue") || text.contains(AGENT_CONTINUE_MARKER)
}

/// Splits `chat` into turns, processing each response with `processor`.
///
/// The first exchange always opens a turn, even if it reads "Continue".
/// An empty export yields no turns.
#[must_use]
pub fn extract_turns(chat: &ChatExport, processor: &Processor<'_>) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();

    for (i, request) in chat.requests.iter().enumerate() {
        let exchange = Exchange {
            ordinal: i + 1,
            request_text: request.message.text.clone(),
            timestamp: request.timestamp,
            model_id: request.model_id.clone(),
            blocks: processor.process(&request.response),
        };

        match turns.last_mut() {
            Some(current) if is_continuation(&exchange.request_text) => {
                current.exchanges.push(exchange);
            }
            _ => turns.push(Turn::new(exchange)),
        }
    }

    turns
}
