use serde::{Deserialize, Serialize};

/// Index of a value slot in a frame scope.
pub type Slot = usize;

/// Index of a compiled block inside its [`Program`](super::Program).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeId(pub usize);

impl std::fmt::Display for CodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block{}", self.0)
    }
}

// =============================================================================
// OP - Bytecode instructions
// =============================================================================

/// One VM instruction. Operands are slot indices into the running frame's
/// scope; `result` is always the slot written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    // output
    Echo { value: Slot },

    // data movement
    /// Copy `expr` into `var`, then into `result`.
    Assign { result: Slot, var: Slot, expr: Slot },

    // strings
    Concat { result: Slot, left: Slot, right: Slot },

    // arithmetic
    Plus { result: Slot, left: Slot, right: Slot },
    Minus { result: Slot, left: Slot, right: Slot },
    Mul { result: Slot, left: Slot, right: Slot },

    // comparison
    Smaller { result: Slot, left: Slot, right: Slot },
    SmallerOrEqual { result: Slot, left: Slot, right: Slot },
    Greater { result: Slot, left: Slot, right: Slot },
    GreaterOrEqual { result: Slot, left: Slot, right: Slot },
    Equal { result: Slot, left: Slot, right: Slot },
    NotEqual { result: Slot, left: Slot, right: Slot },

    // environment
    /// Look up the constant named by the string in `name`, trying the
    /// qualified spelling in `ns_name` first when present.
    ConstFetch {
        result: Slot,
        name: Slot,
        ns_name: Option<Slot>,
    },

    // ==========================================================================
    // Control flow: replace the running frame with one for another block
    // ==========================================================================
    Jump { target: CodeId },

    /// Coerce `cond` to bool and transfer to `if_true` or `if_false`.
    JumpIf {
        cond: Slot,
        if_true: CodeId,
        if_false: CodeId,
    },
}

impl Op {
    /// Upper-case mnemonic used in listings and error locations.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Echo { .. } => "ECHO",
            Op::Assign { .. } => "ASSIGN",
            Op::Concat { .. } => "CONCAT",
            Op::Plus { .. } => "PLUS",
            Op::Minus { .. } => "MINUS",
            Op::Mul { .. } => "MUL",
            Op::Smaller { .. } => "SMALLER",
            Op::SmallerOrEqual { .. } => "SMALLER_EQ",
            Op::Greater { .. } => "GREATER",
            Op::GreaterOrEqual { .. } => "GREATER_EQ",
            Op::Equal { .. } => "EQUAL",
            Op::NotEqual { .. } => "NOT_EQUAL",
            Op::ConstFetch { .. } => "CONST_FETCH",
            Op::Jump { .. } => "JUMP",
            Op::JumpIf { .. } => "JUMP_IF",
        }
    }

    /// Every slot the op reads or writes, in operand order.
    pub fn slots(&self) -> Vec<Slot> {
        match self {
            Op::Echo { value } => vec![*value],
            Op::Assign { result, var, expr } => vec![*result, *var, *expr],
            Op::Concat {
                result,
                left,
                right,
            }
            | Op::Plus {
                result,
                left,
                right,
            }
            | Op::Minus {
                result,
                left,
                right,
            }
            | Op::Mul {
                result,
                left,
                right,
            }
            | Op::Smaller {
                result,
                left,
                right,
            }
            | Op::SmallerOrEqual {
                result,
                left,
                right,
            }
            | Op::Greater {
                result,
                left,
                right,
            }
            | Op::GreaterOrEqual {
                result,
                left,
                right,
            }
            | Op::Equal {
                result,
                left,
                right,
            }
            | Op::NotEqual {
                result,
                left,
                right,
            } => vec![*result, *left, *right],
            Op::ConstFetch {
                result,
                name,
                ns_name,
            } => {
                let mut slots = vec![*result, *name];
                slots.extend(ns_name);
                slots
            }
            Op::Jump { .. } => Vec::new(),
            Op::JumpIf { cond, .. } => vec![*cond],
        }
    }

    /// Blocks this op can transfer control to.
    pub fn targets(&self) -> Vec<CodeId> {
        match self {
            Op::Jump { target } => vec![*target],
            Op::JumpIf {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            _ => Vec::new(),
        }
    }
}
