use crate::lang::{cfg::BlockId, node::Node, operand::OperandId};
use thiserror::Error;

/// Fatal lowering failure. Compilation stops at the first one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A node this backend has no lowering for.
    #[error("compile error: cannot compile {category} '{node_type}'{}{}", at_line(.line), hint_suffix(.hint))]
    UnhandledNode {
        category: &'static str,
        node_type: String,
        line: Option<u32>,
        hint: Option<String>,
    },

    /// A declaration the CFG carries but this core deliberately leaves out.
    #[error("compile error: {construct} '{name}' is not implemented{}", at_line(.line))]
    NotImplemented {
        construct: &'static str,
        name: String,
        line: Option<u32>,
    },

    #[error("compile error: unsupported binary operator '{op}'{}", at_line(.line))]
    UnsupportedOperator { op: String, line: Option<u32> },

    #[error("compile error: unknown literal operand type '{ty}'{}", at_line(.line))]
    UnsupportedLiteral { ty: &'static str, line: Option<u32> },

    #[error("compile error: unknown operand type '{kind}' ({operand}){}", at_line(.line))]
    UnknownOperand {
        kind: &'static str,
        operand: OperandId,
        line: Option<u32>,
    },

    #[error("compile error: operand {0} is not in the graph")]
    DanglingOperand(OperandId),

    #[error("compile error: {0} is not in the graph")]
    UnknownBlock(BlockId),

    #[error("compile error: concat list without operands{}", at_line(.line))]
    EmptyConcatList { line: Option<u32> },

    #[error("compile error: no root blocks to compile")]
    NoRootBlocks,

    /// Internal compiler error (shouldn't happen in normal use)
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

fn at_line(line: &Option<u32>) -> String {
    match line {
        Some(l) => format!(" on line {}", l),
        None => String::new(),
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("\n  hint: {}", h),
        None => String::new(),
    }
}

impl CompileError {
    /// An expression with no lowering.
    pub fn unsupported_expr(node: &Node) -> Self {
        CompileError::UnhandledNode {
            category: "expression",
            node_type: node.type_name().to_string(),
            line: node.line,
            hint: None,
        }
    }

    pub fn unsupported_terminal(node: &Node) -> Self {
        CompileError::UnhandledNode {
            category: "terminal",
            node_type: node.type_name().to_string(),
            line: node.line,
            hint: Some("only echo is lowered by this backend".to_string()),
        }
    }

    pub fn not_implemented(construct: &'static str, name: &str, line: Option<u32>) -> Self {
        CompileError::NotImplemented {
            construct,
            name: name.to_string(),
            line,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }

    /// Attach `line` if the error does not carry one yet.
    ///
    /// Operand-level errors are raised without knowing which node they
    /// belong to; the node loop fills the line in on the way out.
    pub fn or_line(mut self, node_line: Option<u32>) -> Self {
        match &mut self {
            CompileError::UnhandledNode { line, .. }
            | CompileError::NotImplemented { line, .. }
            | CompileError::UnsupportedOperator { line, .. }
            | CompileError::UnsupportedLiteral { line, .. }
            | CompileError::UnknownOperand { line, .. }
            | CompileError::EmptyConcatList { line } => {
                if line.is_none() {
                    *line = node_line;
                }
            }
            CompileError::DanglingOperand(_)
            | CompileError::UnknownBlock(_)
            | CompileError::NoRootBlocks
            | CompileError::Internal(_) => {}
        }
        self
    }
}
