//! Host-side failures.
//!
//! Compile errors (lexical, syntactic, semantic) are data: they are counted
//! and recorded by [`crate::scanner::Diag`] and never abort a compilation.
//! Everything in this module is fatal: it aborts the current module and
//! surfaces from the [`crate::compile`] entry point.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("i/o error")]
    Io(#[from] io::Error),

    #[error("corrupt symbol file: {0}")]
    BadSymbolFile(PathBuf),
}
