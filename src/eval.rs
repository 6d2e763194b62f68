use std::fmt;

use crate::wire::{Operation, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownOperation,
    DivideByZero,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::UnknownOperation => f.write_str("invalid operation"),
            Rejection::DivideByZero => f.write_str("divide by zero"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Value(i32),
    Rejected(Rejection),
}

// All four operators wrap on overflow, so `i32::MIN / -1` yields `i32::MIN`.
// Division truncates toward zero. `Exit` is a session signal, not an
// operator, and is rejected here.
pub fn evaluate(op: Operation, operand1: i32, operand2: i32) -> Outcome {
    match op {
        Operation::Add => Outcome::Value(operand1.wrapping_add(operand2)),
        Operation::Sub => Outcome::Value(operand1.wrapping_sub(operand2)),
        Operation::Mul => Outcome::Value(operand1.wrapping_mul(operand2)),
        Operation::Div if operand2 == 0 => Outcome::Rejected(Rejection::DivideByZero),
        Operation::Div => Outcome::Value(operand1.wrapping_div(operand2)),
        Operation::Exit | Operation::Unknown(_) => {
            Outcome::Rejected(Rejection::UnknownOperation)
        }
    }
}

// The wire carries a single validity flag; the rejection reason stays local.
impl From<Outcome> for Response {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Value(result) => Response::value(result),
            Outcome::Rejected(_) => Response::rejected(),
        }
    }
}
