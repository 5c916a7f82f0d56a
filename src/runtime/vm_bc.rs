use crate::bytecode::{CodeId, CompiledBlock, Op, ProgramBc, Slot, verify};
use crate::lang::value::{Value, ValueType};
use crate::runtime::context::Context;
use crate::runtime::frame::Frame;
use crate::runtime::runtime_error::{Location, RuntimeError, RuntimeErrorKind};
use std::io::Write;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct VmBcConfig {
    /// Opcodes a single run may execute. `None` runs until completion.
    pub max_steps: Option<usize>,
    pub max_frames: usize,
}

impl Default for VmBcConfig {
    fn default() -> Self {
        VmBcConfig {
            max_steps: None,
            max_frames: 10_000,
        }
    }
}

/// What the interpreter does after an opcode.
enum Flow {
    Next,
    Transfer(CodeId),
}

pub struct VmBc {
    config: VmBcConfig,
    steps: usize,
}

impl Default for VmBc {
    fn default() -> Self {
        Self::new()
    }
}

impl VmBc {
    pub fn new() -> Self {
        Self::with_config(VmBcConfig::default())
    }

    pub fn with_config(config: VmBcConfig) -> Self {
        Self { config, steps: 0 }
    }

    pub fn config(&self) -> &VmBcConfig {
        &self.config
    }

    /// Opcodes executed by the last run.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Execute `program` from its entry block until the frame stack drains.
    ///
    /// Frames the host pushed before the call run after the entry block
    /// completes. On failure the frame stack is cleared; output already
    /// written to the sink stays there.
    pub fn run<W: Write>(
        &mut self,
        program: &ProgramBc,
        context: &mut Context<W>,
    ) -> Result<(), RuntimeError> {
        self.steps = 0;

        verify(program).map_err(|e| RuntimeError::internal(e.to_string()))?;
        let entry = program
            .entry_block()
            .ok_or_else(|| RuntimeError::internal("program has no entry block"))?;

        debug!(
            entry = %entry.id,
            blocks = program.blocks.len(),
            slots = program.slot_count,
            "run start"
        );

        let result = self
            .push_frame(context, entry.frame())
            .and_then(|()| self.run_loop(program, context));

        match &result {
            Ok(()) => {
                context.output_mut().flush().map_err(RuntimeErrorKind::from)?;
                debug!(steps = self.steps, "run finished");
            }
            Err(e) => {
                context.clear_frames();
                let _ = context.output_mut().flush();
                debug!(steps = self.steps, error = %e.kind, "run failed");
            }
        }
        result
    }

    fn run_loop<W: Write>(
        &mut self,
        program: &ProgramBc,
        context: &mut Context<W>,
    ) -> Result<(), RuntimeError> {
        while let Some(mut frame) = context.pop() {
            if let Some(continuation) = frame.take_continuation() {
                trace!("continuation");
                continuation();
                continue;
            }
            self.exec_frame(program, context, frame)?;
        }
        Ok(())
    }

    fn push_frame<W: Write>(
        &self,
        context: &mut Context<W>,
        frame: Frame,
    ) -> Result<(), RuntimeError> {
        if context.depth() >= self.config.max_frames {
            return Err(RuntimeErrorKind::FrameLimit(self.config.max_frames).into());
        }
        context.push(frame);
        Ok(())
    }

    fn check_limits(&mut self) -> Result<(), RuntimeErrorKind> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeErrorKind::StepLimit(max));
            }
        }
        Ok(())
    }

    // Execution

    /// Interpret one block frame. Jumps replace the frame in place and keep
    /// going, so a loop never grows the native stack.
    fn exec_frame<W: Write>(
        &mut self,
        program: &ProgramBc,
        context: &mut Context<W>,
        mut frame: Frame,
    ) -> Result<(), RuntimeError> {
        'block: loop {
            let code = frame
                .code()
                .ok_or_else(|| RuntimeError::internal("block frame without code"))?;
            let block = program
                .block(code)
                .ok_or_else(|| RuntimeError::internal(format!("{} does not exist", code)))?;

            while let Some(op) = block.ops.get(frame.pc()) {
                trace!(block = %code, pc = frame.pc(), op = op.mnemonic());

                let flow = self
                    .check_limits()
                    .and_then(|()| self.exec_op(op, &mut frame, context));

                match flow {
                    Ok(Flow::Next) => frame.advance(),
                    Ok(Flow::Transfer(target)) => {
                        let next = program.block(target).ok_or_else(|| {
                            Self::fail(
                                RuntimeErrorKind::Internal(format!("{} does not exist", target)),
                                &frame,
                                block,
                                context,
                            )
                        })?;
                        debug!(from = %code, to = %target, "transfer");
                        frame = next.enter(frame.into_scope(), Some(code));
                        continue 'block;
                    }
                    Err(kind) => return Err(Self::fail(kind, &frame, block, context)),
                }
            }
            return Ok(());
        }
    }

    fn exec_op<W: Write>(
        &self,
        op: &Op,
        frame: &mut Frame,
        context: &mut Context<W>,
    ) -> Result<Flow, RuntimeErrorKind> {
        let scope = frame.scope_mut();

        match *op {
            Op::Echo { value } => {
                let bytes = read(scope, value)?.to_bytes();
                context.output_mut().write_all(&bytes)?;
            }

            Op::Assign { result, var, expr } => {
                let value = read(scope, expr)?.clone();
                write(scope, var, &value)?;
                write(scope, result, &value)?;
            }

            Op::Concat {
                result,
                left,
                right,
            } => {
                let joined = {
                    let l = read(scope, left)?.to_bytes();
                    let r = read(scope, right)?.to_bytes();
                    let mut joined = Vec::with_capacity(l.len() + r.len());
                    joined.extend_from_slice(&l);
                    joined.extend_from_slice(&r);
                    joined
                };
                write(scope, result, &Value::String(joined))?;
            }

            Op::Plus {
                result,
                left,
                right,
            } => arith(scope, "PLUS", result, left, right, i64::checked_add)?,
            Op::Minus {
                result,
                left,
                right,
            } => arith(scope, "MINUS", result, left, right, i64::checked_sub)?,
            Op::Mul {
                result,
                left,
                right,
            } => arith(scope, "MUL", result, left, right, i64::checked_mul)?,

            Op::Smaller {
                result,
                left,
                right,
            } => compare(scope, "SMALLER", result, left, right, |a, b| a < b)?,
            Op::SmallerOrEqual {
                result,
                left,
                right,
            } => compare(scope, "SMALLER_EQ", result, left, right, |a, b| a <= b)?,
            Op::Greater {
                result,
                left,
                right,
            } => compare(scope, "GREATER", result, left, right, |a, b| a > b)?,
            Op::GreaterOrEqual {
                result,
                left,
                right,
            } => compare(scope, "GREATER_EQ", result, left, right, |a, b| a >= b)?,

            Op::Equal {
                result,
                left,
                right,
            } => {
                let eq = read(scope, left)?.loose_eq(read(scope, right)?);
                write(scope, result, &Value::Boolean(eq))?;
            }
            Op::NotEqual {
                result,
                left,
                right,
            } => {
                let eq = read(scope, left)?.loose_eq(read(scope, right)?);
                write(scope, result, &Value::Boolean(!eq))?;
            }

            Op::ConstFetch {
                result,
                name,
                ns_name,
            } => {
                let name = constant_name(scope, name)?;
                let ns_name = ns_name.map(|slot| constant_name(scope, slot)).transpose()?;

                let found = match ns_name.as_deref().and_then(|ns| context.constant_fetch(ns)) {
                    Some(value) => Some(value),
                    None => context.constant_fetch(&name),
                };
                let Some(value) = found else {
                    return Err(RuntimeErrorKind::UndefinedConstant { name, ns_name });
                };
                write(scope, result, &value)?;
            }

            Op::Jump { target } => return Ok(Flow::Transfer(target)),

            Op::JumpIf {
                cond,
                if_true,
                if_false,
            } => {
                let target = if read(scope, cond)?.to_bool() {
                    if_true
                } else {
                    if_false
                };
                return Ok(Flow::Transfer(target));
            }
        }

        Ok(Flow::Next)
    }

    /// Attach the failing location and the pending block frames to `kind`.
    fn fail<W: Write>(
        kind: RuntimeErrorKind,
        frame: &Frame,
        block: &CompiledBlock,
        context: &Context<W>,
    ) -> RuntimeError {
        let pc = frame.pc();
        let location = Location {
            block: block.id,
            pc,
            op: block.ops.get(pc).map_or("<end>", Op::mnemonic),
            line: block.line(pc),
            came_from: frame.came_from(),
        };

        let mut err = RuntimeError::new(kind).at(location);
        for code in context.frame_codes() {
            err = err.with_context(code);
        }
        err.with_context(block.id)
    }
}

// Slot access

fn read(scope: &[Value], slot: Slot) -> Result<&Value, RuntimeErrorKind> {
    scope.get(slot).ok_or_else(|| {
        RuntimeErrorKind::Internal(format!(
            "read of r{} outside scope of {}",
            slot,
            scope.len()
        ))
    })
}

fn write(scope: &mut [Value], slot: Slot, value: &Value) -> Result<(), RuntimeErrorKind> {
    let len = scope.len();
    let target = scope.get_mut(slot).ok_or_else(|| {
        RuntimeErrorKind::Internal(format!("write of r{} outside scope of {}", slot, len))
    })?;
    target.copy_from(value);
    Ok(())
}

fn int_operand(scope: &[Value], op: &'static str, slot: Slot) -> Result<i64, RuntimeErrorKind> {
    let value = read(scope, slot)?;
    value.to_int().map_err(|reason| RuntimeErrorKind::Coercion {
        op,
        slot,
        from: value.value_type(),
        to: ValueType::Integer,
        reason,
    })
}

fn arith(
    scope: &mut [Value],
    op: &'static str,
    result: Slot,
    left: Slot,
    right: Slot,
    f: fn(i64, i64) -> Option<i64>,
) -> Result<(), RuntimeErrorKind> {
    let a = int_operand(scope, op, left)?;
    let b = int_operand(scope, op, right)?;
    let n = f(a, b).ok_or(RuntimeErrorKind::Overflow {
        op,
        left: a,
        right: b,
    })?;
    write(scope, result, &Value::Integer(n))
}

fn compare(
    scope: &mut [Value],
    op: &'static str,
    result: Slot,
    left: Slot,
    right: Slot,
    f: fn(i64, i64) -> bool,
) -> Result<(), RuntimeErrorKind> {
    let a = int_operand(scope, op, left)?;
    let b = int_operand(scope, op, right)?;
    write(scope, result, &Value::Boolean(f(a, b)))
}

fn constant_name(scope: &[Value], slot: Slot) -> Result<String, RuntimeErrorKind> {
    Ok(String::from_utf8_lossy(&read(scope, slot)?.to_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Compiler;
    use crate::lang::cfg::{BlockId, Cfg};
    use crate::lang::node::BinaryOpKind;
    use crate::lang::operand::OperandId;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    // ============================================================
    // Test Helpers
    // ============================================================

    /// One hand-assembled block with `slots` scope slots and the given
    /// constants preloaded.
    fn program_from_ops(slots: usize, constants: Vec<(Slot, Value)>, ops: Vec<Op>) -> ProgramBc {
        let mut block = CompiledBlock::new(CodeId(0), BlockId(0));
        for (i, (slot, value)) in constants.into_iter().enumerate() {
            block.register_constant(OperandId(i), slot, value);
        }
        for op in ops {
            block.add_op(op, None);
        }
        block.scope_size = slots;
        ProgramBc {
            blocks: vec![block],
            entry: CodeId(0),
            slot_count: slots,
        }
    }

    fn run_with_config(
        program: &ProgramBc,
        config: VmBcConfig,
    ) -> (Result<(), RuntimeError>, String) {
        let mut context = Context::new(Vec::new());
        let result = VmBc::with_config(config).run(program, &mut context);
        let out = String::from_utf8_lossy(&context.into_output()).into_owned();
        (result, out)
    }

    /// Run `program` and return everything it echoed.
    fn run_output(program: &ProgramBc) -> String {
        let (result, out) = run_with_config(program, VmBcConfig::default());
        result.expect("run should succeed");
        out
    }

    fn run_err(program: &ProgramBc) -> RuntimeError {
        run_with_config(program, VmBcConfig::default())
            .0
            .expect_err("run should fail")
    }

    fn compile(cfg: &Cfg) -> ProgramBc {
        Compiler::new(cfg).compile_cfg().expect("compiles")
    }

    // ============================================================
    // Opcodes
    // ============================================================

    #[test]
    fn test_echo_writes_string_form() {
        let program = program_from_ops(
            2,
            vec![(0, Value::string("n=")), (1, Value::Integer(42))],
            vec![Op::Echo { value: 0 }, Op::Echo { value: 1 }],
        );
        assert_eq!(run_output(&program), "n=42");
    }

    #[test]
    fn test_echo_unknown_is_empty() {
        let program = program_from_ops(1, vec![], vec![Op::Echo { value: 0 }]);
        assert_eq!(run_output(&program), "");
    }

    #[test]
    fn test_assign_writes_var_and_result() {
        let program = program_from_ops(
            3,
            vec![(2, Value::string("v"))],
            vec![
                Op::Assign {
                    result: 0,
                    var: 1,
                    expr: 2,
                },
                Op::Echo { value: 0 },
                Op::Echo { value: 1 },
            ],
        );
        assert_eq!(run_output(&program), "vv");
    }

    #[test]
    fn test_concat() {
        let program = program_from_ops(
            3,
            vec![(0, Value::string("a")), (1, Value::Integer(7))],
            vec![
                Op::Concat {
                    result: 2,
                    left: 0,
                    right: 1,
                },
                Op::Echo { value: 2 },
            ],
        );
        assert_eq!(run_output(&program), "a7");
    }

    #[test]
    fn test_arithmetic() {
        let program = program_from_ops(
            5,
            vec![(0, Value::Integer(6)), (1, Value::string("4"))],
            vec![
                Op::Plus {
                    result: 2,
                    left: 0,
                    right: 1,
                },
                Op::Minus {
                    result: 3,
                    left: 0,
                    right: 1,
                },
                Op::Mul {
                    result: 4,
                    left: 0,
                    right: 1,
                },
                Op::Echo { value: 2 },
                Op::Echo { value: 3 },
                Op::Echo { value: 4 },
            ],
        );
        assert_eq!(run_output(&program), "10224");
    }

    #[test]
    fn test_comparisons_produce_booleans() {
        let program = program_from_ops(
            6,
            vec![(0, Value::Integer(1)), (1, Value::Integer(2))],
            vec![
                Op::Smaller {
                    result: 2,
                    left: 0,
                    right: 1,
                },
                Op::GreaterOrEqual {
                    result: 3,
                    left: 0,
                    right: 1,
                },
                Op::Equal {
                    result: 4,
                    left: 0,
                    right: 0,
                },
                Op::NotEqual {
                    result: 5,
                    left: 0,
                    right: 1,
                },
                Op::Echo { value: 2 },
                Op::Echo { value: 3 },
                Op::Echo { value: 4 },
                Op::Echo { value: 5 },
            ],
        );
        // false echoes as the empty string
        assert_eq!(run_output(&program), "111");
    }

    #[test]
    fn test_const_fetch_prefers_namespaced_name() {
        let program = program_from_ops(
            3,
            vec![(0, Value::string("A")), (1, Value::string("ns\\A"))],
            vec![
                Op::ConstFetch {
                    result: 2,
                    name: 0,
                    ns_name: Some(1),
                },
                Op::Echo { value: 2 },
            ],
        );
        let mut context = Context::new(Vec::new());
        context.define("A", Value::string("global")).unwrap();
        context.define("ns\\A", Value::string("local")).unwrap();
        VmBc::new().run(&program, &mut context).unwrap();
        assert_eq!(context.into_output(), b"local");
    }

    #[test]
    fn test_const_fetch_falls_back_to_name() {
        let program = program_from_ops(
            3,
            vec![(0, Value::string("PHP_INT_SIZE")), (1, Value::string("ns\\PHP_INT_SIZE"))],
            vec![
                Op::ConstFetch {
                    result: 2,
                    name: 0,
                    ns_name: Some(1),
                },
                Op::Echo { value: 2 },
            ],
        );
        assert_eq!(run_output(&program), "8");
    }

    // ============================================================
    // Errors
    // ============================================================

    #[test]
    fn test_undefined_constant() {
        let program = program_from_ops(
            2,
            vec![(0, Value::string("NOPE"))],
            vec![Op::ConstFetch {
                result: 1,
                name: 0,
                ns_name: None,
            }],
        );
        let err = run_err(&program);
        assert!(matches!(
            &err.kind,
            RuntimeErrorKind::UndefinedConstant { name, ns_name: None } if name == "NOPE"
        ));
        let location = err.location.expect("located");
        assert_eq!(location.op, "CONST_FETCH");
        assert_eq!(location.pc, 0);
        assert!(!err.call_stack.is_empty());
    }

    #[test]
    fn test_non_numeric_operand_is_coercion_error() {
        let program = program_from_ops(
            3,
            vec![(0, Value::string("abc")), (1, Value::Integer(1))],
            vec![Op::Plus {
                result: 2,
                left: 0,
                right: 1,
            }],
        );
        let err = run_err(&program);
        assert!(matches!(
            err.kind,
            RuntimeErrorKind::Coercion {
                op: "PLUS",
                slot: 0,
                from: ValueType::String,
                to: ValueType::Integer,
                ..
            }
        ));
        assert!(!err.is_internal());
    }

    #[test]
    fn test_overflow() {
        let program = program_from_ops(
            3,
            vec![(0, Value::Integer(i64::MAX)), (1, Value::Integer(1))],
            vec![Op::Plus {
                result: 2,
                left: 0,
                right: 1,
            }],
        );
        assert!(matches!(
            run_err(&program).kind,
            RuntimeErrorKind::Overflow { op: "PLUS", .. }
        ));
    }

    #[test]
    fn test_bad_slot_rejected_before_execution() {
        let program = program_from_ops(1, vec![], vec![Op::Echo { value: 5 }]);
        let err = run_err(&program);
        assert!(err.is_internal());
        assert!(err.location.is_none());
    }

    #[test]
    fn test_output_before_failure_is_kept() {
        let program = program_from_ops(
            3,
            vec![(0, Value::string("partial")), (1, Value::string("MISSING"))],
            vec![
                Op::Echo { value: 0 },
                Op::ConstFetch {
                    result: 2,
                    name: 1,
                    ns_name: None,
                },
            ],
        );
        let (result, out) = run_with_config(&program, VmBcConfig::default());
        assert!(result.is_err());
        assert_eq!(out, "partial");
    }

    // ============================================================
    // Control flow
    // ============================================================

    #[test]
    fn test_counting_loop() {
        crate::test_utils::init_test_logging();

        let mut cfg = Cfg::new();
        let entry = cfg.new_root();
        let cond = cfg.new_block();
        let body = cfg.new_block();
        let exit = cfg.new_block();

        let i = cfg.var("i");
        let zero = cfg.long(0);
        cfg.assign(entry, i, zero);
        cfg.jump(entry, cond);

        let three = cfg.long(3);
        let lt = cfg.binary(cond, BinaryOpKind::Smaller, i, three);
        cfg.jump_if(cond, lt, body, exit);

        let one = cfg.long(1);
        let sum = cfg.binary(body, BinaryOpKind::Plus, i, one);
        cfg.assign(body, i, sum);
        let x = cfg.string("x");
        cfg.echo(body, x);
        cfg.jump(body, cond);

        let done = cfg.string("done");
        cfg.echo(exit, done);

        assert_eq!(run_output(&compile(&cfg)), "xxxdone");
    }

    #[test]
    fn test_jump_if_takes_exactly_one_branch() {
        for (flag, expected) in [(1, "T"), (0, "F")] {
            let mut cfg = Cfg::new();
            let entry = cfg.new_root();
            let t = cfg.new_block();
            let f = cfg.new_block();

            let cond = cfg.long(flag);
            cfg.jump_if(entry, cond, t, f);
            let ts = cfg.string("T");
            cfg.echo(t, ts);
            let fs = cfg.string("F");
            cfg.echo(f, fs);

            assert_eq!(run_output(&compile(&cfg)), expected);
        }
    }

    #[test]
    fn test_step_limit_stops_infinite_loop() {
        let mut cfg = Cfg::new();
        let entry = cfg.new_root();
        cfg.jump(entry, entry);

        let config = VmBcConfig {
            max_steps: Some(100),
            ..VmBcConfig::default()
        };
        let (result, _) = run_with_config(&compile(&cfg), config);
        let err = result.expect_err("step limit");
        assert!(matches!(err.kind, RuntimeErrorKind::StepLimit(100)));
        assert_eq!(err.location.map(|l| l.came_from), Some(Some(CodeId(0))));
    }

    #[test]
    fn test_frame_limit() {
        let program = program_from_ops(0, vec![], vec![]);
        let mut context = Context::new(Vec::new());
        context.push(Frame::continuation(|| {}));
        context.push(Frame::continuation(|| {}));

        let config = VmBcConfig {
            max_frames: 2,
            ..VmBcConfig::default()
        };
        let err = VmBc::with_config(config)
            .run(&program, &mut context)
            .expect_err("frame limit");
        assert!(matches!(err.kind, RuntimeErrorKind::FrameLimit(2)));
        assert_eq!(context.depth(), 0);
    }

    // ============================================================
    // Continuations
    // ============================================================

    #[test]
    fn test_continuations_run_after_entry_in_lifo_order() {
        let program = program_from_ops(
            1,
            vec![(0, Value::string("main"))],
            vec![Op::Echo { value: 0 }],
        );
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut context = Context::new(Vec::new());

        for name in ["first", "second"] {
            let log = log.clone();
            context.push(Frame::continuation(move || log.borrow_mut().push(name)));
        }

        let mut vm = VmBc::new();
        vm.run(&program, &mut context).unwrap();

        assert_eq!(*log.borrow(), vec!["second", "first"]);
        assert_eq!(context.output().as_slice(), b"main");
        assert_eq!(vm.steps(), 1);
    }
}
