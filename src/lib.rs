//! Compiles a control-flow graph of PHP-style statements into per-block
//! register bytecode and runs it on a frame-stack VM.
//!
//! ```ignore
//! let mut cfg = Cfg::new();
//! let entry = cfg.new_root();
//! let hello = cfg.string("hello");
//! cfg.echo(entry, hello);
//!
//! let mut context = Context::stdout();
//! cfgvm::compile_and_run(&cfg, &mut context)?;
//! ```

pub mod bytecode;
pub mod error;
pub mod lang;
pub mod runtime;

pub use bytecode::{CompileError, Compiler, ProgramBc};
pub use error::{Error, Result};
pub use lang::cfg::{BlockId, Cfg};
pub use lang::value::Value;
pub use runtime::{Context, Frame, RuntimeError, VmBc, VmBcConfig};

use std::io::Write;

/// Compile every root of `cfg` and run the program with default limits.
pub fn compile_and_run<W: Write>(cfg: &Cfg, context: &mut Context<W>) -> Result<ProgramBc> {
    let program = Compiler::new(cfg).compile_cfg()?;
    bytecode::verify(&program)?;
    VmBc::new().run(&program, context)?;
    Ok(program)
}

/// Test utilities for enabling logging in tests
#[cfg(test)]
pub mod test_utils {
    /// Initialize a tracing subscriber that writes through the test harness.
    /// Level comes from `RUST_LOG`, defaulting to debug.
    pub fn init_test_logging() {
        use tracing_subscriber::{EnvFilter, fmt};

        // Already initialized by another test is fine.
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}
