use std::collections::{HashMap, VecDeque};

use crate::{
    bytecode::{
        CompiledBlock, ProgramBc,
        compile_error::CompileError,
        op::{CodeId, Op, Slot},
    },
    lang::{
        cfg::{BlockId, Cfg},
        node::{BinaryOpKind, Expr, Node, NodeKind, Stmt, Terminal},
        operand::{Literal, Operand, OperandId},
        value::Value,
    },
};

/// Lowers a [`Cfg`] into a [`ProgramBc`].
///
/// Every CFG block is lowered at most once. A block is registered in `seen`
/// (and queued) the first time anything refers to it, before its body is
/// lowered, so back-edges resolve to the already-registered id instead of
/// recursing.
pub struct Compiler<'cfg> {
    cfg: &'cfg Cfg,

    /// Output blocks, indexed by `CodeId`
    blocks: Vec<CompiledBlock>,

    /// CFG block -> compiled block
    seen: HashMap<BlockId, CodeId>,

    /// Registered blocks whose bodies are not lowered yet
    pending: VecDeque<CodeId>,

    /// Unit-wide slot assignment for temporaries and literals
    slots: HashMap<OperandId, Slot>,
    next_slot: Slot,
}

impl<'cfg> Compiler<'cfg> {
    pub fn new(cfg: &'cfg Cfg) -> Self {
        Self {
            cfg,
            blocks: Vec::new(),
            seen: HashMap::new(),
            pending: VecDeque::new(),
            slots: HashMap::new(),
            next_slot: 0,
        }
    }

    /// Compile starting from the graph's own root list.
    pub fn compile_cfg(self) -> Result<ProgramBc, CompileError> {
        let roots = self.cfg.roots().to_vec();
        self.compile(&roots)
    }

    /// Compile every block reachable from `roots`. The first root becomes the
    /// program entry.
    pub fn compile(mut self, roots: &[BlockId]) -> Result<ProgramBc, CompileError> {
        let mut entry = None;
        for &root in roots {
            let id = self.compile_cfg_block(root)?;
            if entry.is_none() {
                entry = Some(id);
            }
        }
        let entry = entry.ok_or(CompileError::NoRootBlocks)?;

        let slot_count = self.next_slot;
        for block in &mut self.blocks {
            block.scope_size = slot_count;
        }

        tracing::debug!(
            blocks = self.blocks.len(),
            slots = slot_count,
            %entry,
            "compiled program"
        );

        Ok(ProgramBc {
            blocks: self.blocks,
            entry,
            slot_count,
        })
    }

    fn compile_cfg_block(&mut self, block: BlockId) -> Result<CodeId, CompileError> {
        let id = self.block_ref(block)?;
        while let Some(next) = self.pending.pop_front() {
            self.compile_block(next)?;
        }
        Ok(id)
    }

    /// The compiled id for `block`, registering it on first sight.
    fn block_ref(&mut self, block: BlockId) -> Result<CodeId, CompileError> {
        if let Some(&id) = self.seen.get(&block) {
            return Ok(id);
        }
        if self.cfg.block(block).is_none() {
            return Err(CompileError::UnknownBlock(block));
        }

        let id = CodeId(self.blocks.len());
        self.blocks.push(CompiledBlock::new(id, block));
        self.seen.insert(block, id);
        self.pending.push_back(id);
        Ok(id)
    }

    fn compile_block(&mut self, id: CodeId) -> Result<(), CompileError> {
        let cfg = self.cfg;
        let origin = self.blocks[id.0].origin;
        let block = cfg
            .block(origin)
            .ok_or(CompileError::UnknownBlock(origin))?;

        for node in &block.children {
            self.compile_node(node, id)
                .map_err(|e| e.or_line(node.line))?;
        }

        tracing::debug!(
            block = %id,
            %origin,
            ops = self.blocks[id.0].ops.len(),
            "compiled block"
        );
        Ok(())
    }

    fn compile_node(&mut self, node: &Node, id: CodeId) -> Result<(), CompileError> {
        match &node.kind {
            NodeKind::Expr(expr) => self.compile_expr(node, expr, id),
            NodeKind::Stmt(stmt) => self.compile_stmt(node, stmt, id),
            NodeKind::Terminal(terminal) => self.compile_terminal(node, terminal, id),
        }
    }

    fn emit(&mut self, id: CodeId, op: Op, line: Option<u32>) {
        tracing::trace!(block = %id, op = ?op, "emit");
        self.blocks[id.0].add_op(op, line);
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expr(&mut self, node: &Node, expr: &Expr, id: CodeId) -> Result<(), CompileError> {
        let op = match expr {
            Expr::BinaryOp {
                op,
                left,
                right,
                result,
            } => {
                let make = binary_opcode(*op).ok_or_else(|| CompileError::UnsupportedOperator {
                    op: op.type_name().to_string(),
                    line: node.line,
                })?;
                let result = self.compile_operand(*result, id)?;
                let left = self.compile_operand(*left, id)?;
                let right = self.compile_operand(*right, id)?;
                make(result, left, right)
            }

            Expr::Assign { var, expr, result } => Op::Assign {
                result: self.compile_operand(*result, id)?,
                var: self.compile_operand(*var, id)?,
                expr: self.compile_operand(*expr, id)?,
            },

            Expr::ConcatList { list, result } => {
                return self.compile_concat_list(list, *result, id, node.line);
            }

            Expr::ConstFetch {
                name,
                ns_name,
                result,
            } => {
                let result = self.compile_operand(*result, id)?;
                let name = self.compile_operand(*name, id)?;
                let ns_name = match ns_name {
                    Some(ns) => Some(self.compile_operand(*ns, id)?),
                    None => None,
                };
                Op::ConstFetch {
                    result,
                    name,
                    ns_name,
                }
            }

            Expr::FuncCall { .. } => return Err(CompileError::unsupported_expr(node)),
        };

        self.emit(id, op, node.line);
        Ok(())
    }

    /// Expand `a . b . c ...` into a left-to-right chain of binary concats,
    /// each into a fresh slot, then assign the last one to `result`.
    fn compile_concat_list(
        &mut self,
        list: &[OperandId],
        result: OperandId,
        id: CodeId,
        line: Option<u32>,
    ) -> Result<(), CompileError> {
        let (first, rest) = list
            .split_first()
            .ok_or(CompileError::EmptyConcatList { line })?;

        let mut acc = self.compile_operand(*first, id)?;
        for operand in rest {
            let right = self.compile_operand(*operand, id)?;
            let tmp = self.fresh_slot();
            self.emit(
                id,
                Op::Concat {
                    result: tmp,
                    left: acc,
                    right,
                },
                line,
            );
            acc = tmp;
        }

        let result = self.compile_operand(result, id)?;
        self.emit(
            id,
            Op::Assign {
                result,
                var: result,
                expr: acc,
            },
            line,
        );
        Ok(())
    }

    // =========================================================================
    // Statements and terminals
    // =========================================================================

    fn compile_stmt(&mut self, node: &Node, stmt: &Stmt, id: CodeId) -> Result<(), CompileError> {
        let op = match stmt {
            Stmt::Jump { target } => Op::Jump {
                target: self.block_ref(*target)?,
            },
            Stmt::JumpIf {
                cond,
                if_true,
                if_false,
            } => Op::JumpIf {
                cond: self.compile_operand(*cond, id)?,
                if_true: self.block_ref(*if_true)?,
                if_false: self.block_ref(*if_false)?,
            },
            Stmt::Function { name } => {
                return Err(CompileError::not_implemented("function", name, node.line));
            }
            Stmt::Class { name } => {
                return Err(CompileError::not_implemented("class", name, node.line));
            }
            Stmt::Interface { name } => {
                return Err(CompileError::not_implemented("interface", name, node.line));
            }
            Stmt::Trait { name } => {
                return Err(CompileError::not_implemented("trait", name, node.line));
            }
        };

        self.emit(id, op, node.line);
        Ok(())
    }

    fn compile_terminal(
        &mut self,
        node: &Node,
        terminal: &Terminal,
        id: CodeId,
    ) -> Result<(), CompileError> {
        match terminal {
            Terminal::Echo { expr } => {
                let value = self.compile_operand(*expr, id)?;
                self.emit(id, Op::Echo { value }, node.line);
                Ok(())
            }
            Terminal::Return { .. } => Err(CompileError::unsupported_terminal(node)),
        }
    }

    // =========================================================================
    // Operands
    // =========================================================================

    fn compile_operand(&mut self, operand: OperandId, id: CodeId) -> Result<Slot, CompileError> {
        let cfg = self.cfg;
        match cfg
            .operand(operand)
            .ok_or(CompileError::DanglingOperand(operand))?
        {
            Operand::Literal(literal) => {
                let value = match literal {
                    Literal::String(s) => Value::string(s.as_bytes()),
                    Literal::Long(n) => Value::Integer(*n),
                    other => {
                        return Err(CompileError::UnsupportedLiteral {
                            ty: other.type_name(),
                            line: None,
                        });
                    }
                };
                let slot = self.slot_for(operand);
                Ok(self.blocks[id.0].register_constant(operand, slot, value))
            }
            Operand::Temporary { .. } => {
                let slot = self.slot_for(operand);
                self.blocks[id.0].record_var_slot(operand, slot);
                Ok(slot)
            }
            other @ Operand::Variable { .. } => Err(CompileError::UnknownOperand {
                kind: other.kind_name(),
                operand,
                line: None,
            }),
        }
    }

    /// Stable slot for `operand`, assigned on first encounter.
    fn slot_for(&mut self, operand: OperandId) -> Slot {
        if let Some(&slot) = self.slots.get(&operand) {
            return slot;
        }
        let slot = self.fresh_slot();
        self.slots.insert(operand, slot);
        slot
    }

    /// A slot no CFG operand maps to.
    fn fresh_slot(&mut self) -> Slot {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }
}

/// Fixed operator table. `None` means the VM has no opcode for it.
fn binary_opcode(op: BinaryOpKind) -> Option<fn(Slot, Slot, Slot) -> Op> {
    let make: fn(Slot, Slot, Slot) -> Op = match op {
        BinaryOpKind::Concat => |result, left, right| Op::Concat { result, left, right },
        BinaryOpKind::Plus => |result, left, right| Op::Plus { result, left, right },
        BinaryOpKind::Minus => |result, left, right| Op::Minus { result, left, right },
        BinaryOpKind::Mul => |result, left, right| Op::Mul { result, left, right },
        BinaryOpKind::Smaller => |result, left, right| Op::Smaller { result, left, right },
        BinaryOpKind::SmallerOrEqual => {
            |result, left, right| Op::SmallerOrEqual { result, left, right }
        }
        BinaryOpKind::Greater => |result, left, right| Op::Greater { result, left, right },
        BinaryOpKind::GreaterOrEqual => {
            |result, left, right| Op::GreaterOrEqual { result, left, right }
        }
        BinaryOpKind::Equal => |result, left, right| Op::Equal { result, left, right },
        BinaryOpKind::NotEqual => |result, left, right| Op::NotEqual { result, left, right },
        BinaryOpKind::Div | BinaryOpKind::Mod => return None,
    };
    Some(make)
}
