use crate::bytecode::CodeId;
use crate::lang::value::Value;

/// Host action run in place of a block body.
pub type Continuation = Box<dyn FnOnce()>;

/// One entry of the VM's frame stack.
///
/// Either bound to a compiled block (with its scope and program counter) or
/// carrying a continuation the loop invokes instead of interpreting ops.
pub struct Frame {
    code: Option<CodeId>,
    scope: Vec<Value>,
    pc: usize,
    came_from: Option<CodeId>,
    continuation: Option<Continuation>,
}

impl Frame {
    /// Frame executing `code` from its first op. Callers go through
    /// [`CompiledBlock::enter`](crate::bytecode::CompiledBlock::enter) so the
    /// constant pool gets loaded.
    pub(crate) fn for_block(code: CodeId, scope: Vec<Value>, came_from: Option<CodeId>) -> Self {
        Self {
            code: Some(code),
            scope,
            pc: 0,
            came_from,
            continuation: None,
        }
    }

    /// Frame that runs `f` when popped.
    pub fn continuation(f: impl FnOnce() + 'static) -> Self {
        Self {
            code: None,
            scope: Vec::new(),
            pc: 0,
            came_from: None,
            continuation: Some(Box::new(f)),
        }
    }

    pub fn code(&self) -> Option<CodeId> {
        self.code
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn came_from(&self) -> Option<CodeId> {
        self.came_from
    }

    pub fn scope(&self) -> &[Value] {
        &self.scope
    }

    pub fn is_continuation(&self) -> bool {
        self.continuation.is_some()
    }

    pub(crate) fn scope_mut(&mut self) -> &mut [Value] {
        &mut self.scope
    }

    pub(crate) fn advance(&mut self) {
        self.pc += 1;
    }

    pub(crate) fn take_continuation(&mut self) -> Option<Continuation> {
        self.continuation.take()
    }

    /// Give up the scope so the next block's frame can take it over.
    pub(crate) fn into_scope(self) -> Vec<Value> {
        self.scope
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("code", &self.code)
            .field("pc", &self.pc)
            .field("came_from", &self.came_from)
            .field("scope_len", &self.scope.len())
            .field("continuation", &self.continuation.is_some())
            .finish()
    }
}
