//! Token estimation and budget accounting
//!
//! Estimates are character based and deliberately pessimistic: the remote
//! limit is a hard ceiling, so over-counting is the safe direction.

use serde::{Deserialize, Serialize};

use crate::conversation::ChatMessage;

/// Multiplier applied on top of the raw chars-per-token estimate
pub const DEFAULT_SAFETY_FACTOR: f64 = 1.15;

/// Characters-per-token assumption
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMode {
    #[default]
    Fast,
    Conservative,
    Optimistic,
}

impl EstimateMode {
    pub fn chars_per_token(self) -> f64 {
        match self {
            EstimateMode::Fast => 3.0,
            EstimateMode::Conservative => 2.5,
            EstimateMode::Optimistic => 3.5,
        }
    }
}

/// Estimate the token count of `text`.
///
/// Absent or empty text is zero tokens. Otherwise the count is
/// `ceil(chars / ratio * safety_factor)` where chars are Unicode scalar values.
pub fn estimate(text: Option<&str>, mode: EstimateMode, safety_factor: f64) -> u64 {
    let Some(text) = text else { return 0 };
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    ((chars as f64 / mode.chars_per_token()) * safety_factor).ceil() as u64
}

/// Estimate with the default mode and safety factor
pub fn estimate_tokens(text: &str) -> u64 {
    estimate(Some(text), EstimateMode::Fast, DEFAULT_SAFETY_FACTOR)
}

/// Sum of per-message estimates, used to rebuild a running total from scratch
pub fn estimate_messages(messages: &[ChatMessage]) -> u64 {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

/// Where a conversation sits against its limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Normal,
    /// Past `warn_at`: the user should be told
    Warning,
    /// Past `compact_at`: history should be compacted before continuing
    CompactionRecommended,
}

/// Snapshot of estimated usage against the remote limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBudget {
    pub estimate: u64,
    pub limit: u64,
    pub warn_at: f64,
    pub compact_at: f64,
}

impl TokenBudget {
    /// Fraction of the limit used. A zero limit counts as fully used.
    pub fn ratio(&self) -> f64 {
        if self.limit == 0 {
            return 1.0;
        }
        self.estimate as f64 / self.limit as f64
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.estimate)
    }

    pub fn status(&self) -> BudgetStatus {
        let ratio = self.ratio();
        if ratio >= self.compact_at {
            BudgetStatus::CompactionRecommended
        } else if ratio >= self.warn_at {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Normal
        }
    }
}

impl std::fmt::Display for TokenBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "~{} / {} tokens ({:.1}%)",
            self.estimate,
            self.limit,
            self.ratio() * 100.0
        )
    }
}
