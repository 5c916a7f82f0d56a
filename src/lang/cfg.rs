//! In-memory control-flow graph handed over by the CFG producer.
//!
//! Blocks and operands live in one arena; their ids are the identity keys the
//! compiler memoizes on. The builder methods are the whole producer-facing
//! surface: allocate blocks and operands, then append nodes in order.

use super::node::{BinaryOpKind, Expr, Node, Stmt, Terminal};
use super::operand::{Literal, Operand, OperandId};
use serde::{Deserialize, Serialize};

/// Identity of a block inside a [`Cfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block#{}", self.0)
    }
}

/// A basic block: children run in order, control leaves through the last
/// `Jump`/`JumpIf` (or falls off the end).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, Default)]
pub struct Cfg {
    blocks: Vec<Block>,
    operands: Vec<Operand>,
    roots: Vec<BlockId>,
}

impl Cfg {
    pub fn new() -> Self {
        Self::default()
    }

    // Arena access

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0)
    }

    pub fn operand(&self, id: OperandId) -> Option<&Operand> {
        self.operands.get(id.0)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter().enumerate().map(|(i, b)| (BlockId(i), b))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Root blocks in declaration order. The first one is the entry.
    pub fn roots(&self) -> &[BlockId] {
        &self.roots
    }

    // Builder

    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push(Block::default());
        BlockId(self.blocks.len() - 1)
    }

    /// Allocate a block and mark it as a root.
    pub fn new_root(&mut self) -> BlockId {
        let id = self.new_block();
        self.roots.push(id);
        id
    }

    pub fn add_operand(&mut self, operand: Operand) -> OperandId {
        self.operands.push(operand);
        OperandId(self.operands.len() - 1)
    }

    pub fn temp(&mut self) -> OperandId {
        self.add_operand(Operand::Temporary { original: None })
    }

    /// A temporary standing for the source variable `$name`.
    pub fn var(&mut self, name: &str) -> OperandId {
        self.add_operand(Operand::Temporary {
            original: Some(name.to_string()),
        })
    }

    pub fn literal(&mut self, literal: Literal) -> OperandId {
        self.add_operand(Operand::Literal(literal))
    }

    pub fn string(&mut self, s: &str) -> OperandId {
        self.literal(Literal::String(s.to_string()))
    }

    pub fn long(&mut self, n: i64) -> OperandId {
        self.literal(Literal::Long(n))
    }

    /// Append a node to `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` was not allocated by this arena.
    pub fn push(&mut self, block: BlockId, node: impl Into<Node>) {
        self.blocks[block.0].children.push(node.into());
    }

    // Shorthands for the common shapes; each returns the result operand.

    pub fn binary(
        &mut self,
        block: BlockId,
        op: BinaryOpKind,
        left: OperandId,
        right: OperandId,
    ) -> OperandId {
        let result = self.temp();
        self.push(
            block,
            Expr::BinaryOp {
                op,
                left,
                right,
                result,
            },
        );
        result
    }

    pub fn assign(&mut self, block: BlockId, var: OperandId, expr: OperandId) -> OperandId {
        let result = self.temp();
        self.push(block, Expr::Assign { var, expr, result });
        result
    }

    pub fn concat_list(&mut self, block: BlockId, list: Vec<OperandId>) -> OperandId {
        let result = self.temp();
        self.push(block, Expr::ConcatList { list, result });
        result
    }

    pub fn const_fetch(
        &mut self,
        block: BlockId,
        name: &str,
        ns_name: Option<&str>,
    ) -> OperandId {
        let name = self.string(name);
        let ns_name = ns_name.map(|ns| self.string(ns));
        let result = self.temp();
        self.push(
            block,
            Expr::ConstFetch {
                name,
                ns_name,
                result,
            },
        );
        result
    }

    pub fn echo(&mut self, block: BlockId, expr: OperandId) {
        self.push(block, Terminal::Echo { expr });
    }

    pub fn jump(&mut self, block: BlockId, target: BlockId) {
        self.push(block, Stmt::Jump { target });
    }

    pub fn jump_if(&mut self, block: BlockId, cond: OperandId, if_true: BlockId, if_false: BlockId) {
        self.push(
            block,
            Stmt::JumpIf {
                cond,
                if_true,
                if_false,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::node::NodeKind;

    #[test]
    fn test_ids_are_dense_and_distinct() {
        let mut cfg = Cfg::new();
        let a = cfg.new_root();
        let b = cfg.new_block();
        let t1 = cfg.temp();
        let t2 = cfg.temp();

        assert_eq!(a, BlockId(0));
        assert_eq!(b, BlockId(1));
        assert_ne!(t1, t2);
        assert_eq!(cfg.roots(), &[a]);
        assert_eq!(cfg.block_count(), 2);
    }

    #[test]
    fn test_push_keeps_order() {
        let mut cfg = Cfg::new();
        let b = cfg.new_root();
        let s = cfg.string("hi");
        cfg.echo(b, s);
        let other = cfg.new_block();
        cfg.jump(b, other);

        let children = &cfg.block(b).unwrap().children;
        assert_eq!(children.len(), 2);
        assert!(matches!(children[0].kind, NodeKind::Terminal(Terminal::Echo { .. })));
        assert!(matches!(children[1].kind, NodeKind::Stmt(Stmt::Jump { target }) if target == other));
    }

    #[test]
    fn test_const_fetch_allocates_name_literals() {
        let mut cfg = Cfg::new();
        let b = cfg.new_root();
        cfg.const_fetch(b, "FOO", Some("App\\FOO"));

        match &cfg.block(b).unwrap().children[0].kind {
            NodeKind::Expr(Expr::ConstFetch { name, ns_name, .. }) => {
                assert_eq!(
                    cfg.operand(*name),
                    Some(&Operand::Literal(Literal::String("FOO".into())))
                );
                assert!(ns_name.is_some());
            }
            other => panic!("expected ConstFetch, got {:?}", other),
        }
    }
}
