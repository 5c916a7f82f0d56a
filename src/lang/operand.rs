use serde::{Deserialize, Serialize};

/// Identity of an operand inside a [`Cfg`](super::cfg::Cfg) arena.
///
/// Two operand references denote the same temporary (or the same literal
/// occurrence) exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperandId(pub usize);

impl std::fmt::Display for OperandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An operand as produced by the CFG builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A literal with its reconstructed type.
    Literal(Literal),

    /// An SSA-like temporary. `original` names the source variable it
    /// stands for, if any.
    Temporary { original: Option<String> },

    /// A named variable that was not resolved to a temporary.
    Variable { name: String },
}

impl Operand {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operand::Literal(_) => "literal",
            Operand::Temporary { .. } => "temporary",
            Operand::Variable { .. } => "variable",
        }
    }
}

/// Literal payload, tagged by the type the type reconstructor assigned.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Long(i64),
    Double(f64),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::String(_) => "string",
            Literal::Long(_) => "int",
            Literal::Double(_) => "float",
            Literal::Bool(_) => "bool",
            Literal::Null => "null",
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Literal(Literal::String(s)) => write!(f, "LITERAL({:?})", s),
            Operand::Literal(Literal::Long(n)) => write!(f, "LITERAL({})", n),
            Operand::Literal(Literal::Double(n)) => write!(f, "LITERAL({})", n),
            Operand::Literal(Literal::Bool(b)) => write!(f, "LITERAL({})", b),
            Operand::Literal(Literal::Null) => write!(f, "LITERAL(null)"),
            Operand::Temporary { original: Some(name) } => write!(f, "Var(${})", name),
            Operand::Temporary { original: None } => write!(f, "Var"),
            Operand::Variable { name } => write!(f, "${}", name),
        }
    }
}
