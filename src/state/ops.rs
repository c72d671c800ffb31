//! State update operations
//!
//! Numeric operators share one signed 64-bit path: the current value (absent
//! means zero) and the operand are parsed as integers, combined with checked
//! arithmetic and written back as a decimal string.

use super::State;
use serde::{Deserialize, Serialize};
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateOpError {
    #[error("{key}: {value:?} is not an integer: {source}")]
    Parse {
        key: String,
        value: String,
        source: ParseIntError,
    },
    #[error("{key}: {source}")]
    Arithmetic {
        key: String,
        source: ArithmeticError,
    },
}

/// One mutation of conversation state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StateOp {
    Set { key: String, value: String },
    Delete { key: String },
    Add { key: String, value: String },
    Sub { key: String, value: String },
    Mul { key: String, value: String },
    Div { key: String, value: String },
}

impl StateOp {
    pub fn key(&self) -> &str {
        match self {
            StateOp::Set { key, .. }
            | StateOp::Delete { key }
            | StateOp::Add { key, .. }
            | StateOp::Sub { key, .. }
            | StateOp::Mul { key, .. }
            | StateOp::Div { key, .. } => key,
        }
    }

    /// Right-hand operand; deletes have none
    pub fn value(&self) -> Option<&str> {
        match self {
            StateOp::Delete { .. } => None,
            StateOp::Set { value, .. }
            | StateOp::Add { value, .. }
            | StateOp::Sub { value, .. }
            | StateOp::Mul { value, .. }
            | StateOp::Div { value, .. } => Some(value),
        }
    }

    /// Same operation with its operand rewritten, e.g. by template expansion
    pub fn try_map_value<E>(
        &self,
        f: impl FnOnce(&str) -> Result<String, E>,
    ) -> Result<StateOp, E> {
        let key = self.key().to_string();
        Ok(match self {
            StateOp::Set { value, .. } => StateOp::Set { key, value: f(value)? },
            StateOp::Delete { .. } => StateOp::Delete { key },
            StateOp::Add { value, .. } => StateOp::Add { key, value: f(value)? },
            StateOp::Sub { value, .. } => StateOp::Sub { key, value: f(value)? },
            StateOp::Mul { value, .. } => StateOp::Mul { key, value: f(value)? },
            StateOp::Div { value, .. } => StateOp::Div { key, value: f(value)? },
        })
    }

    pub fn apply(&self, state: &mut State) -> Result<(), StateOpError> {
        match self {
            StateOp::Set { key, value } => {
                state.set(key.clone(), value.clone());
                Ok(())
            }
            StateOp::Delete { key } => {
                state.delete(key);
                Ok(())
            }
            StateOp::Add { key, value } => arithmetic(state, key, value, |lhs, rhs| {
                lhs.checked_add(rhs).ok_or(ArithmeticError::Overflow)
            }),
            StateOp::Sub { key, value } => arithmetic(state, key, value, |lhs, rhs| {
                lhs.checked_sub(rhs).ok_or(ArithmeticError::Overflow)
            }),
            StateOp::Mul { key, value } => arithmetic(state, key, value, |lhs, rhs| {
                lhs.checked_mul(rhs).ok_or(ArithmeticError::Overflow)
            }),
            StateOp::Div { key, value } => arithmetic(state, key, value, |lhs, rhs| {
                if rhs == 0 {
                    return Err(ArithmeticError::DivisionByZero);
                }
                lhs.checked_div(rhs).ok_or(ArithmeticError::Overflow)
            }),
        }
    }
}

fn parse(key: &str, value: &str) -> Result<i64, StateOpError> {
    value.trim().parse::<i64>().map_err(|source| StateOpError::Parse {
        key: key.to_string(),
        value: value.to_string(),
        source,
    })
}

fn arithmetic(
    state: &mut State,
    key: &str,
    operand: &str,
    op: impl FnOnce(i64, i64) -> Result<i64, ArithmeticError>,
) -> Result<(), StateOpError> {
    let current = match state.get(key) {
        Some(value) => parse(key, value)?,
        None => 0,
    };
    let rhs = parse(key, operand)?;
    let result = op(current, rhs).map_err(|source| StateOpError::Arithmetic {
        key: key.to_string(),
        source,
    })?;
    state.set(key, result.to_string());
    Ok(())
}
