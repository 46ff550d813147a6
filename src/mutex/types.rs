use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// The two interchangeable mutual-exclusion strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    TokenRing,
    RicartAgrawala,
}

impl Algorithm {
    /// Resolves a user or wire supplied name. Unknown names fall back to the
    /// token ring.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "tr" | "token_ring" | "tokenring" => Self::TokenRing,
            "ra" | "ricart_agrawala" | "ricartagrawala" => Self::RicartAgrawala,
            other => {
                tracing::warn!("Unknown algorithm '{}', using Token Ring", other);
                Self::TokenRing
            }
        }
    }

    /// Short name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TokenRing => "tr",
            Self::RicartAgrawala => "ra",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TokenRing => "Token Ring",
            Self::RicartAgrawala => "Ricart-Agrawala",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Arithmetic applied to the shared value inside the critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
}

pub const OPERAND_RANGE: std::ops::RangeInclusive<i64> = 1..=100;

impl MathOp {
    pub const ALL: [MathOp; 4] = [Self::Add, Self::Sub, Self::Mul, Self::Div];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Picks an operation and a non-zero operand.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> (Self, i64) {
        (Self::random(rng), rng.gen_range(OPERAND_RANGE))
    }

    /// Wrapping arithmetic so a long run cannot overflow-panic. Division by
    /// zero leaves the value unchanged; generated operands are never zero.
    pub fn apply(&self, value: i64, operand: i64) -> i64 {
        match self {
            Self::Add => value.wrapping_add(operand),
            Self::Sub => value.wrapping_sub(operand),
            Self::Mul => value.wrapping_mul(operand),
            Self::Div => value.checked_div(operand).unwrap_or(value),
        }
    }
}

/// Initial value for a calculation started without one.
pub fn random_start_value<R: Rng + ?Sized>(rng: &mut R) -> i64 {
    rng.gen_range(OPERAND_RANGE)
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::Div => "Div",
        };
        f.write_str(name)
    }
}

/// State of one distributed calculation, shared by both strategies.
#[derive(Debug, Clone, Default)]
pub struct CalculationState {
    pub current_value: i64,
    pub needs_critical_section: bool,
    pub in_critical_section: bool,
    /// Set by `Start`, cleared by `Done`. `Some` while the worker runs.
    pub started_at: Option<Instant>,
}

impl CalculationState {
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Evidence handed to `Acquire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// The token arrived (Token Ring).
    Token,
    /// A peer replied OK (Ricart-Agrawala).
    Reply(crate::membership::types::Address),
}
