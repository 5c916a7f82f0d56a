use std::{env, fs, path::Path, process};

use cfgvm::bytecode::disasm::print_bc;
use cfgvm::bytecode::{Compiler, ProgramBc, verify};
use cfgvm::lang::cfg::Cfg;
use cfgvm::lang::node::{BinaryOpKind, Expr, Node, Stmt, Terminal};
use cfgvm::runtime::{Context, VmBc, VmBcConfig};

const IMAGE_EXTENSION: &str = "cfgbc";

struct Options {
    bytecode: bool,
    emit: Option<String>,
    max_steps: Option<usize>,
    image: Option<String>,
}

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let options = match parse_args(&args[1..]) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            print_usage();
            process::exit(1);
        }
    };

    let program = match &options.image {
        Some(path) => load_image(path),
        None => compile_demo(),
    };

    if options.bytecode {
        print_bc(&program);
    }

    if let Some(path) = &options.emit {
        emit_image(&program, path);
        return;
    }

    run(&program, options.max_steps);
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    // RUST_LOG controls the level, warnings only by default
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        bytecode: false,
        emit: None,
        max_steps: None,
        image: None,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--bc" | "--bytecode" => options.bytecode = true,
            "--emit" => {
                let path = iter.next().ok_or("--emit needs an output path")?;
                options.emit = Some(path.clone());
            }
            "--max-steps" => {
                let n = iter.next().ok_or("--max-steps needs a number")?;
                let n = n
                    .parse()
                    .map_err(|_| format!("--max-steps expects a number, got '{}'", n))?;
                options.max_steps = Some(n);
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option '{}'", flag)),
            path => {
                if options.image.is_some() {
                    return Err(format!("unexpected argument '{}'", path));
                }
                options.image = Some(path.to_string());
            }
        }
    }
    Ok(options)
}

fn print_usage() {
    println!("cfgvm - CFG bytecode compiler and block VM");
    println!();
    println!("Usage:");
    println!("  cfgvm                        Compile and run the built-in demo loop");
    println!("  cfgvm <file.cfgbc>           Run a compiled image");
    println!("  cfgvm --bc [file.cfgbc]      Print the disassembly before running");
    println!("  cfgvm --emit <file.cfgbc>    Write the program as an image instead of running");
    println!("  cfgvm --max-steps <n>        Stop after n opcodes");
    println!("  cfgvm --help, -h             Show this help");
    println!();
    println!("Logging is controlled with RUST_LOG (e.g. RUST_LOG=cfgvm=debug).");
}

fn ensure_extension(filename: &str) {
    let path = Path::new(filename);
    if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXTENSION) {
        eprintln!("Error: expected a .{} file, got {}", IMAGE_EXTENSION, filename);
        process::exit(1);
    }
}

fn load_image(filename: &str) -> ProgramBc {
    ensure_extension(filename);

    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };

    let program = match ProgramBc::from_bytes(&bytes) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Invalid image '{}': {}", filename, e);
            process::exit(1);
        }
    };

    if let Err(e) = verify(&program) {
        eprintln!("Invalid image '{}': {}", filename, e);
        process::exit(1);
    }
    program
}

fn emit_image(program: &ProgramBc, filename: &str) {
    ensure_extension(filename);

    let bytes = match program.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to encode program: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(filename, &bytes) {
        eprintln!("Failed to write '{}': {}", filename, e);
        process::exit(1);
    }
    eprintln!("wrote {} bytes to {}", bytes.len(), filename);
}

fn compile_demo() -> ProgramBc {
    let cfg = demo_cfg();
    match Compiler::new(&cfg).compile_cfg() {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            process::exit(1);
        }
    }
}

fn run(program: &ProgramBc, max_steps: Option<usize>) {
    let config = VmBcConfig {
        max_steps,
        ..VmBcConfig::default()
    };
    let mut vm = VmBc::with_config(config);
    let mut context = Context::stdout();

    if let Err(e) = vm.run(program, &mut context) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

/// The graph for
///
/// ```php
/// $i = 0;
/// while ($i < 100) {
///     $i = $i + 1;
///     $message = "test " . $i . " \n";
///     echo $message . "another\n";
/// }
/// ```
fn demo_cfg() -> Cfg {
    let mut cfg = Cfg::new();
    let entry = cfg.new_root();
    let cond = cfg.new_block();
    let body = cfg.new_block();
    let exit = cfg.new_block();

    // $i = 0
    let i = cfg.var("i");
    let zero = cfg.long(0);
    let result = cfg.temp();
    cfg.push(
        entry,
        Node::from(Expr::Assign {
            var: i,
            expr: zero,
            result,
        })
        .at_line(1),
    );
    cfg.push(entry, Node::from(Stmt::Jump { target: cond }).at_line(2));

    // $i < 100
    let limit = cfg.long(100);
    let lt = cfg.temp();
    cfg.push(
        cond,
        Node::from(Expr::BinaryOp {
            op: BinaryOpKind::Smaller,
            left: i,
            right: limit,
            result: lt,
        })
        .at_line(2),
    );
    cfg.push(
        cond,
        Node::from(Stmt::JumpIf {
            cond: lt,
            if_true: body,
            if_false: exit,
        })
        .at_line(2),
    );

    // $i = $i + 1
    let one = cfg.long(1);
    let sum = cfg.temp();
    cfg.push(
        body,
        Node::from(Expr::BinaryOp {
            op: BinaryOpKind::Plus,
            left: i,
            right: one,
            result: sum,
        })
        .at_line(3),
    );
    let result = cfg.temp();
    cfg.push(
        body,
        Node::from(Expr::Assign {
            var: i,
            expr: sum,
            result,
        })
        .at_line(3),
    );

    // $message = "test $i \n"
    let message = cfg.var("message");
    let prefix = cfg.string("test ");
    let suffix = cfg.string(" \n");
    let interpolated = cfg.temp();
    cfg.push(
        body,
        Node::from(Expr::ConcatList {
            list: vec![prefix, i, suffix],
            result: interpolated,
        })
        .at_line(4),
    );
    let result = cfg.temp();
    cfg.push(
        body,
        Node::from(Expr::Assign {
            var: message,
            expr: interpolated,
            result,
        })
        .at_line(4),
    );

    // echo $message . "another\n"
    let another = cfg.string("another\n");
    let line = cfg.temp();
    cfg.push(
        body,
        Node::from(Expr::BinaryOp {
            op: BinaryOpKind::Concat,
            left: message,
            right: another,
            result: line,
        })
        .at_line(5),
    );
    cfg.push(body, Node::from(Terminal::Echo { expr: line }).at_line(5));
    cfg.push(body, Node::from(Stmt::Jump { target: cond }).at_line(6));

    cfg
}
