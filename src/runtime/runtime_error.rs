use crate::bytecode::{CodeId, Slot};
use crate::lang::value::{CoercionError, ValueType};
use std::io;
use thiserror::Error;

/// What went wrong while executing.
#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
    #[error("type error: cannot use {from} in r{slot} as {to} for {op}: {reason}")]
    Coercion {
        op: &'static str,
        slot: Slot,
        from: ValueType,
        to: ValueType,
        #[source]
        reason: CoercionError,
    },

    #[error("integer overflow in {op}: {left} and {right}")]
    Overflow {
        op: &'static str,
        left: i64,
        right: i64,
    },

    #[error("undefined constant '{name}'{}", ns_suffix(.ns_name))]
    UndefinedConstant {
        name: String,
        ns_name: Option<String>,
    },

    #[error("execution step limit exceeded ({0})")]
    StepLimit(usize),

    #[error("frame stack limit exceeded ({0})")]
    FrameLimit(usize),

    #[error("output error: {0}")]
    Io(#[from] io::Error),

    /// The compiled program and the VM disagree. A defect in this crate,
    /// not in the program being run.
    #[error("internal error: {0}")]
    Internal(String),
}

fn ns_suffix(ns_name: &Option<String>) -> String {
    match ns_name {
        Some(ns) => format!(" (also tried '{}')", ns),
        None => String::new(),
    }
}

/// Where in the compiled program an error was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub block: CodeId,
    pub pc: usize,
    pub op: &'static str,
    pub line: Option<u32>,
    pub came_from: Option<CodeId>,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} pc {} ({})", self.block, self.pc, self.op)?;
        if let Some(line) = self.line {
            write!(f, ", line {}", line)?;
        }
        if let Some(from) = self.came_from {
            write!(f, ", entered from {}", from)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub location: Option<Location>,
    pub call_stack: Vec<CodeId>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.kind)?;

        if let Some(location) = &self.location {
            write!(f, "\n  at {}", location)?;
        }

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().rev().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        RuntimeError {
            kind,
            location: None,
            call_stack: Vec::new(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RuntimeError::new(RuntimeErrorKind::Internal(msg.into()))
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_context(mut self, block: CodeId) -> Self {
        self.call_stack.push(block);
        self
    }

    /// True when the failure points at a compiler/VM defect rather than at
    /// the program being run.
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, RuntimeErrorKind::Internal(_))
    }
}
