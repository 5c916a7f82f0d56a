use crate::bytecode::{CompileError, VerifyError};
use crate::runtime::RuntimeError;
use thiserror::Error;

/// Any failure on the way from a CFG to finished execution.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("image error: {0}")]
    Image(#[from] postcard::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
