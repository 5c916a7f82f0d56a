use super::cfg::BlockId;
use super::operand::OperandId;

/// One child of a CFG block, with the source line it came from (if the
/// producer tracked it).
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub line: Option<u32>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self { kind, line: None }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Human-readable name of the construct, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Expr(expr) => expr.type_name(),
            NodeKind::Stmt(stmt) => stmt.type_name(),
            NodeKind::Terminal(terminal) => terminal.type_name(),
        }
    }
}

impl From<Expr> for Node {
    fn from(expr: Expr) -> Self {
        Node::new(NodeKind::Expr(expr))
    }
}

impl From<Stmt> for Node {
    fn from(stmt: Stmt) -> Self {
        Node::new(NodeKind::Stmt(stmt))
    }
}

impl From<Terminal> for Node {
    fn from(terminal: Terminal) -> Self {
        Node::new(NodeKind::Terminal(terminal))
    }
}

/// Node categories. Each lowers differently.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Expr(Expr),
    Stmt(Stmt),
    Terminal(Terminal),
}

// ───────────────────────────── Expressions ─────────────────────────────

/// Value-producing operations. Every expression writes its `result` operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `result = left <op> right`
    BinaryOp {
        op: BinaryOpKind,
        left: OperandId,
        right: OperandId,
        result: OperandId,
    },

    /// `var = expr`, with the assigned value also available as `result`.
    Assign {
        var: OperandId,
        expr: OperandId,
        result: OperandId,
    },

    /// N-ary string concatenation, e.g. produced by interpolation:
    /// `"a $b c"` becomes `ConcatList(["a ", $b, " c"])`.
    ConcatList {
        list: Vec<OperandId>,
        result: OperandId,
    },

    /// Constant lookup. `ns_name` is the namespace-qualified spelling that is
    /// tried first when present.
    ConstFetch {
        name: OperandId,
        ns_name: Option<OperandId>,
        result: OperandId,
    },

    /// Call of a named function.
    FuncCall {
        name: OperandId,
        args: Vec<OperandId>,
        result: OperandId,
    },
}

impl Expr {
    pub fn type_name(&self) -> &'static str {
        match self {
            Expr::BinaryOp { op, .. } => op.type_name(),
            Expr::Assign { .. } => "Expr_Assign",
            Expr::ConcatList { .. } => "Expr_ConcatList",
            Expr::ConstFetch { .. } => "Expr_ConstFetch",
            Expr::FuncCall { .. } => "Expr_FuncCall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOpKind {
    Concat,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Smaller,
    SmallerOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
}

impl BinaryOpKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            BinaryOpKind::Concat => "Expr_BinaryOp_Concat",
            BinaryOpKind::Plus => "Expr_BinaryOp_Plus",
            BinaryOpKind::Minus => "Expr_BinaryOp_Minus",
            BinaryOpKind::Mul => "Expr_BinaryOp_Mul",
            BinaryOpKind::Div => "Expr_BinaryOp_Div",
            BinaryOpKind::Mod => "Expr_BinaryOp_Mod",
            BinaryOpKind::Smaller => "Expr_BinaryOp_Smaller",
            BinaryOpKind::SmallerOrEqual => "Expr_BinaryOp_SmallerOrEqual",
            BinaryOpKind::Greater => "Expr_BinaryOp_Greater",
            BinaryOpKind::GreaterOrEqual => "Expr_BinaryOp_GreaterOrEqual",
            BinaryOpKind::Equal => "Expr_BinaryOp_Equal",
            BinaryOpKind::NotEqual => "Expr_BinaryOp_NotEqual",
        }
    }
}

// ───────────────────────────── Statements ──────────────────────────────

/// Structural statements: control transfer and declarations.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Unconditional transfer to `target`.
    Jump { target: BlockId },

    /// Transfer to `if_true` when `cond` is truthy, else to `if_false`.
    JumpIf {
        cond: OperandId,
        if_true: BlockId,
        if_false: BlockId,
    },

    Function { name: String },
    Class { name: String },
    Interface { name: String },
    Trait { name: String },
}

impl Stmt {
    pub fn type_name(&self) -> &'static str {
        match self {
            Stmt::Jump { .. } => "Stmt_Jump",
            Stmt::JumpIf { .. } => "Stmt_JumpIf",
            Stmt::Function { .. } => "Stmt_Function",
            Stmt::Class { .. } => "Stmt_Class",
            Stmt::Interface { .. } => "Stmt_Interface",
            Stmt::Trait { .. } => "Stmt_Trait",
        }
    }
}

// ───────────────────────────── Terminals ───────────────────────────────

/// Nodes with an effect outside the value graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    /// Write the string form of `expr` to the output.
    Echo { expr: OperandId },

    Return { expr: Option<OperandId> },
}

impl Terminal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Terminal::Echo { .. } => "Terminal_Echo",
            Terminal::Return { .. } => "Terminal_Return",
        }
    }
}
