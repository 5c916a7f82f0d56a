use crate::bytecode::{
    ProgramBc,
    op::{CodeId, Slot},
};
use thiserror::Error;

/// A structural defect in a compiled program.
///
/// The compiler never produces these; they show up for hand-built or
/// decoded programs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("verify error: entry {0} does not exist")]
    MissingEntry(CodeId),

    #[error("verify error: {block} is stored at index {index}")]
    MisplacedBlock { block: CodeId, index: usize },

    #[error("verify error: {block} pc {pc} ({op}) uses slot {slot}, scope has {scope_size}")]
    SlotOutOfRange {
        block: CodeId,
        pc: usize,
        op: &'static str,
        slot: Slot,
        scope_size: usize,
    },

    #[error("verify error: {block} constant pool uses slot {slot}, scope has {scope_size}")]
    ConstantOutOfRange {
        block: CodeId,
        slot: Slot,
        scope_size: usize,
    },

    #[error("verify error: {block} pc {pc} ({op}) targets missing {target}")]
    MissingTarget {
        block: CodeId,
        pc: usize,
        op: &'static str,
        target: CodeId,
    },

    #[error("verify error: {block} has {ops} ops but {lines} line entries")]
    LineTableMismatch {
        block: CodeId,
        ops: usize,
        lines: usize,
    },
}

/// Check that every slot and block reference in `program` resolves.
///
/// Passing this is what lets the interpreter treat a bad reference as an
/// internal fault rather than user input.
pub fn verify(program: &ProgramBc) -> Result<(), VerifyError> {
    if program.block(program.entry).is_none() {
        return Err(VerifyError::MissingEntry(program.entry));
    }

    for (index, block) in program.blocks.iter().enumerate() {
        if block.id.0 != index {
            return Err(VerifyError::MisplacedBlock {
                block: block.id,
                index,
            });
        }
        if block.ops.len() != block.lines.len() {
            return Err(VerifyError::LineTableMismatch {
                block: block.id,
                ops: block.ops.len(),
                lines: block.lines.len(),
            });
        }

        for constant in &block.constants {
            if constant.slot >= block.scope_size {
                return Err(VerifyError::ConstantOutOfRange {
                    block: block.id,
                    slot: constant.slot,
                    scope_size: block.scope_size,
                });
            }
        }

        for (pc, op) in block.ops.iter().enumerate() {
            if let Some(&slot) = op.slots().iter().find(|&&s| s >= block.scope_size) {
                return Err(VerifyError::SlotOutOfRange {
                    block: block.id,
                    pc,
                    op: op.mnemonic(),
                    slot,
                    scope_size: block.scope_size,
                });
            }
            if let Some(&target) = op
                .targets()
                .iter()
                .find(|t| program.block(**t).is_none())
            {
                return Err(VerifyError::MissingTarget {
                    block: block.id,
                    pc,
                    op: op.mnemonic(),
                    target,
                });
            }
        }
    }

    Ok(())
}
