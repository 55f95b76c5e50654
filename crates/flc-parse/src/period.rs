use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::tokenizer::{CmpOp, LogicOp};

static IN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\(\s*&np\s*in\s*\(\s*([\d,\s]+)\)\s*\)$").unwrap());
static SIMPLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\(\s*&np\s*([><=]+)\s*(\d+)\s*\)$").unwrap());
static LOGIC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\(\s*&np\s*([><=]+)\s*(\d+)\s*(and|or)\s*&np\s*([><=]+)\s*(\d+)\s*\)$")
        .unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed period clause `{clause}`")]
pub struct PeriodExprError {
    pub clause: String,
}

/// A parsed `periodClause`: a tiny predicate over the report's period
/// code (`&NP`). Clauses come in three shapes — membership, one
/// comparison, or two comparisons joined by and/or — and are evaluated
/// numerically; there is no expression engine behind this.
#[derive(Debug, Clone, PartialEq)]
pub enum PeriodClause {
    Always,
    In(Vec<i64>),
    Cmp(CmpOp, i64),
    Pair {
        left: (CmpOp, i64),
        op: LogicOp,
        right: (CmpOp, i64),
    },
}

impl PeriodClause {
    pub fn parse(clause: &str) -> Result<Self, PeriodExprError> {
        let clause = clause.trim();
        if clause.is_empty() {
            return Ok(PeriodClause::Always);
        }
        let lowered = clause.to_lowercase();

        if lowered.contains(" in") || lowered.contains("in(") || lowered.contains("in (") {
            Self::parse_in(clause)
        } else if lowered.contains("and") || lowered.contains("or") {
            Self::parse_pair(clause)
        } else {
            Self::parse_simple(clause)
        }
    }

    fn err(clause: &str) -> PeriodExprError {
        PeriodExprError {
            clause: clause.to_string(),
        }
    }

    fn parse_in(clause: &str) -> Result<Self, PeriodExprError> {
        let caps = IN_PATTERN.captures(clause).ok_or_else(|| Self::err(clause))?;
        let codes = caps[1]
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| item.parse::<i64>().map_err(|_| Self::err(clause)))
            .collect::<Result<Vec<_>, _>>()?;
        if codes.is_empty() {
            return Err(Self::err(clause));
        }
        Ok(PeriodClause::In(codes))
    }

    fn parse_simple(clause: &str) -> Result<Self, PeriodExprError> {
        let caps = SIMPLE_PATTERN
            .captures(clause)
            .ok_or_else(|| Self::err(clause))?;
        let (op, num) = Self::parse_cmp(&caps[1], &caps[2]).ok_or_else(|| Self::err(clause))?;
        Ok(PeriodClause::Cmp(op, num))
    }

    fn parse_pair(clause: &str) -> Result<Self, PeriodExprError> {
        let caps = LOGIC_PATTERN
            .captures(clause)
            .ok_or_else(|| Self::err(clause))?;
        let left = Self::parse_cmp(&caps[1], &caps[2]).ok_or_else(|| Self::err(clause))?;
        let op = if caps[3].eq_ignore_ascii_case("and") {
            LogicOp::And
        } else {
            LogicOp::Or
        };
        let right = Self::parse_cmp(&caps[4], &caps[5]).ok_or_else(|| Self::err(clause))?;
        Ok(PeriodClause::Pair { left, op, right })
    }

    fn parse_cmp(op: &str, num: &str) -> Option<(CmpOp, i64)> {
        Some((CmpOp::parse(op)?, num.parse().ok()?))
    }

    /// Evaluate against a period code. A missing or non-numeric code
    /// satisfies nothing (except the empty clause).
    pub fn matches(&self, period_code: Option<&str>) -> bool {
        if matches!(self, PeriodClause::Always) {
            return true;
        }
        let Some(code) = period_code.and_then(|c| c.trim().parse::<i64>().ok()) else {
            return false;
        };
        match self {
            PeriodClause::Always => true,
            PeriodClause::In(codes) => codes.contains(&code),
            PeriodClause::Cmp(op, num) => op.eval_i64(code, *num),
            PeriodClause::Pair { left, op, right } => op.eval(
                left.0.eval_i64(code, left.1),
                right.0.eval_i64(code, right.1),
            ),
        }
    }
}
