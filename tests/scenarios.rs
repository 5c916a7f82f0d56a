use cfgvm::bytecode::CompileError;
use cfgvm::lang::node::BinaryOpKind;
use cfgvm::runtime::RuntimeErrorKind;
use cfgvm::{Cfg, Context, Error, ProgramBc, Value, VmBc, VmBcConfig, compile_and_run};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

/// Compile and run `cfg`, returning the echoed text.
fn run(cfg: &Cfg) -> Result<String, Error> {
    let mut context = Context::new(Vec::new());
    compile_and_run(cfg, &mut context)?;
    Ok(String::from_utf8_lossy(&context.into_output()).into_owned())
}

/// `$i = 0; while ($i < 3) { $i = $i + 1; echo "x"; }`
fn xxx_loop() -> Cfg {
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

    cfg
}

#[test]
fn test_loop_echoes_three_times() {
    assert_eq!(run(&xxx_loop()).unwrap(), "xxx");
}

#[test]
fn test_echo_concat() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_root();
    let a = cfg.string("a");
    let b = cfg.string("b");
    let ab = cfg.binary(entry, BinaryOpKind::Concat, a, b);
    cfg.echo(entry, ab);

    assert_eq!(run(&cfg).unwrap(), "ab");
}

#[test]
fn test_concat_list_joins_left_to_right() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_root();
    let n = cfg.temp();
    let seven = cfg.long(7);
    cfg.assign(entry, n, seven);

    let a = cfg.string("a");
    let c = cfg.string("c");
    let joined = cfg.concat_list(entry, vec![a, n, c]);
    cfg.echo(entry, joined);

    assert_eq!(run(&cfg).unwrap(), "a7c");
}

#[test]
fn test_branch_on_comparison() {
    let build = |left: i64, right: i64| {
        let mut cfg = Cfg::new();
        let entry = cfg.new_root();
        let yes = cfg.new_block();
        let no = cfg.new_block();
        let l = cfg.long(left);
        let r = cfg.long(right);
        let eq = cfg.binary(entry, BinaryOpKind::Equal, l, r);
        cfg.jump_if(entry, eq, yes, no);
        let y = cfg.string("same");
        cfg.echo(yes, y);
        let n = cfg.string("different");
        cfg.echo(no, n);
        cfg
    };

    assert_eq!(run(&build(2, 2)).unwrap(), "same");
    assert_eq!(run(&build(2, 3)).unwrap(), "different");
}

#[test]
fn test_undefined_constant_fails() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_root();
    let before = cfg.string("before ");
    cfg.echo(entry, before);
    let value = cfg.const_fetch(entry, "UNDEFINED_THING", None);
    cfg.echo(entry, value);

    let mut context = Context::new(Vec::new());
    let err = compile_and_run(&cfg, &mut context).expect_err("constant is undefined");

    let err = match err {
        Error::Runtime(err) => err,
        other => panic!("expected a runtime error, got {:?}", other),
    };
    assert!(matches!(
        &err.kind,
        RuntimeErrorKind::UndefinedConstant { name, .. } if name == "UNDEFINED_THING"
    ));
    assert!(!err.is_internal());
    assert_eq!(context.into_output(), b"before ");
}

#[test]
fn test_host_constant() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_root();
    let value = cfg.const_fetch(entry, "GREETING", Some("App\\GREETING"));
    cfg.echo(entry, value);

    let mut context = Context::new(Vec::new());
    context.define("GREETING", Value::string("hello")).unwrap();
    compile_and_run(&cfg, &mut context).unwrap();

    assert_eq!(context.into_output(), b"hello");
}

#[test]
fn test_compile_error_surfaces_before_running() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_root();
    let hi = cfg.string("hi");
    cfg.echo(entry, hi);
    let a = cfg.long(4);
    let b = cfg.long(2);
    cfg.binary(entry, BinaryOpKind::Div, a, b);

    let err = run(&cfg).expect_err("division is not supported");
    assert!(matches!(
        err,
        Error::Compile(CompileError::UnsupportedOperator { .. })
    ));
}

#[test]
fn test_step_limit_stops_runaway_loop() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_root();
    let spin = cfg.new_block();
    cfg.jump(entry, spin);
    let dot = cfg.string(".");
    cfg.echo(spin, dot);
    cfg.jump(spin, spin);

    let program = cfgvm::Compiler::new(&cfg).compile_cfg().unwrap();
    let mut vm = VmBc::with_config(VmBcConfig {
        max_steps: Some(21),
        ..VmBcConfig::default()
    });
    let mut context = Context::new(Vec::new());
    let err = vm.run(&program, &mut context).expect_err("runaway loop");

    assert!(matches!(err.kind, RuntimeErrorKind::StepLimit(21)));
    // 1 jump into the loop, then 10 echo + jump rounds
    assert_eq!(context.into_output(), b"..........");
}

#[test]
fn test_continuation_runs_after_program() {
    let cfg = xxx_loop();
    let program = cfgvm::Compiler::new(&cfg).compile_cfg().unwrap();

    let seen = Rc::new(RefCell::new(false));
    let flag = seen.clone();
    let mut context = Context::new(Vec::new());
    context.push(cfgvm::Frame::continuation(move || {
        *flag.borrow_mut() = true;
    }));

    VmBc::new().run(&program, &mut context).unwrap();

    assert!(*seen.borrow());
    assert_eq!(context.depth(), 0);
    assert_eq!(context.into_output(), b"xxx");
}

#[test]
fn test_image_runs_like_the_original() {
    let cfg = xxx_loop();
    let program = cfgvm::Compiler::new(&cfg).compile_cfg().unwrap();

    let bytes = program.to_bytes().unwrap();
    let decoded = ProgramBc::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, program);

    let mut context = Context::new(Vec::new());
    VmBc::new().run(&decoded, &mut context).unwrap();
    assert_eq!(context.into_output(), b"xxx");
}

#[test]
fn test_corrupt_image_is_rejected() {
    let cfg = xxx_loop();
    let program = cfgvm::Compiler::new(&cfg).compile_cfg().unwrap();
    let bytes = program.to_bytes().unwrap();

    assert!(ProgramBc::from_bytes(&bytes[..bytes.len() / 2]).is_err());
}
