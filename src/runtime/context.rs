use crate::lang::value::Value;
use crate::runtime::frame::Frame;
use std::collections::HashMap;
use std::io::{self, Write};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefineError {
    #[error("constant '{0}' already defined")]
    AlreadyDefined(String),
}

/// Execution environment for one program run: the frame stack, the constant
/// table and the output sink `echo` writes to.
pub struct Context<W: Write = io::Stdout> {
    frames: Vec<Frame>,
    constants: HashMap<String, Value>,
    output: W,
}

impl Context<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Context<W> {
    pub fn new(output: W) -> Self {
        Self {
            frames: Vec::new(),
            constants: HashMap::new(),
            output,
        }
    }

    /// Register a host constant. Each name can be bound once, and built-in
    /// names cannot be rebound.
    pub fn define(&mut self, name: impl Into<String>, value: Value) -> Result<(), DefineError> {
        let name = name.into();
        if builtin_constant(&name).is_some() || self.constants.contains_key(&name) {
            return Err(DefineError::AlreadyDefined(name));
        }
        self.constants.insert(name, value);
        Ok(())
    }

    /// Resolve `name` against host constants, then built-ins.
    pub fn constant_fetch(&self, name: &str) -> Option<Value> {
        self.constants
            .get(name)
            .cloned()
            .or_else(|| builtin_constant(name))
    }

    // Frame stack

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Blocks of the pending block frames, bottom of the stack first.
    pub fn frame_codes(&self) -> Vec<crate::bytecode::CodeId> {
        self.frames.iter().filter_map(Frame::code).collect()
    }

    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }

    // Output

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

/// Constants every program can see. `true`, `false` and `null` match
/// case-insensitively.
fn builtin_constant(name: &str) -> Option<Value> {
    match name {
        "PHP_INT_MAX" => return Some(Value::Integer(i64::MAX)),
        "PHP_INT_MIN" => return Some(Value::Integer(i64::MIN)),
        "PHP_INT_SIZE" => return Some(Value::Integer(8)),
        "PHP_EOL" => return Some(Value::string("\n")),
        _ => {}
    }
    if name.eq_ignore_ascii_case("true") {
        Some(Value::Boolean(true))
    } else if name.eq_ignore_ascii_case("false") {
        Some(Value::Boolean(false))
    } else if name.eq_ignore_ascii_case("null") {
        Some(Value::Unknown)
    } else {
        None
    }
}
