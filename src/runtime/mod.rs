pub mod context;
pub mod frame;
pub mod runtime_error;
pub mod vm_bc;

pub use context::{Context, DefineError};
pub use frame::{Continuation, Frame};
pub use runtime_error::{Location, RuntimeError, RuntimeErrorKind};
pub use vm_bc::{VmBc, VmBcConfig};
