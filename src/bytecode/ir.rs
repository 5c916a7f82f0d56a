use crate::bytecode::op::{CodeId, Op, Slot};
use crate::lang::{cfg::BlockId, operand::OperandId, value::Value};
use crate::runtime::frame::Frame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A compiled bytecode program: the block graph plus its entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramBc {
    /// Compiled blocks, indexed by [`CodeId`]. One per distinct CFG block.
    pub blocks: Vec<CompiledBlock>,

    /// Block execution starts from.
    pub entry: CodeId,

    /// Slots used by the whole unit. Every block's scope has this size.
    pub slot_count: usize,
}

impl ProgramBc {
    pub fn entry(&self) -> CodeId {
        self.entry
    }

    pub fn block(&self, id: CodeId) -> Option<&CompiledBlock> {
        self.blocks.get(id.0)
    }

    pub fn entry_block(&self) -> Option<&CompiledBlock> {
        self.block(self.entry)
    }

    /// The compiled block lowered from `origin`, if any.
    pub fn block_for(&self, origin: BlockId) -> Option<&CompiledBlock> {
        self.blocks.iter().find(|b| b.origin == origin)
    }

    /// Encode as a compact binary image.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode an image produced by [`ProgramBc::to_bytes`]. The result is
    /// not trusted: run it through the verifier before executing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// A literal materialized into the constant pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub operand: OperandId,
    pub slot: Slot,
    pub value: Value,
}

/// The lowered form of one CFG block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledBlock {
    pub id: CodeId,

    /// CFG block this was lowered from.
    pub origin: BlockId,

    pub ops: Vec<Op>,

    /// Source line of each op, parallel to `ops`.
    pub lines: Vec<Option<u32>>,

    /// Temporaries referenced by this block and the slots they live in.
    pub slots: BTreeMap<OperandId, Slot>,

    /// Constant pool, in registration order.
    pub constants: Vec<Constant>,

    pub scope_size: usize,
}

impl CompiledBlock {
    pub fn new(id: CodeId, origin: BlockId) -> Self {
        Self {
            id,
            origin,
            ops: Vec::new(),
            lines: Vec::new(),
            slots: BTreeMap::new(),
            constants: Vec::new(),
            scope_size: 0,
        }
    }

    pub fn add_op(&mut self, op: Op, line: Option<u32>) {
        self.ops.push(op);
        self.lines.push(line);
    }

    pub fn line(&self, pc: usize) -> Option<u32> {
        self.lines.get(pc).copied().flatten()
    }

    pub fn constant(&self, operand: OperandId) -> Option<&Constant> {
        self.constants.iter().find(|c| c.operand == operand)
    }

    /// Register `value` for the literal `operand` at `slot`.
    ///
    /// Registering the same literal again returns the first slot and keeps
    /// the first value.
    pub fn register_constant(&mut self, operand: OperandId, slot: Slot, value: Value) -> Slot {
        if let Some(existing) = self.constant(operand) {
            return existing.slot;
        }
        self.constants.push(Constant {
            operand,
            slot,
            value,
        });
        slot
    }

    pub fn record_var_slot(&mut self, operand: OperandId, slot: Slot) {
        self.slots.insert(operand, slot);
    }

    /// A fresh frame with an unknown-initialised scope.
    pub fn frame(&self) -> Frame {
        self.enter(Vec::new(), None)
    }

    /// A frame for this block that takes over `scope` from the frame control
    /// arrives from. The constant pool is (re)loaded into it.
    pub fn enter(&self, mut scope: Vec<Value>, from: Option<CodeId>) -> Frame {
        if scope.len() < self.scope_size {
            scope.resize(self.scope_size, Value::Unknown);
        }
        for constant in &self.constants {
            if let Some(slot) = scope.get_mut(constant.slot) {
                slot.copy_from(&constant.value);
            }
        }
        Frame::for_block(self.id, scope, from)
    }
}
