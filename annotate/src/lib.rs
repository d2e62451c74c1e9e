/// Annotation engine for a2gdb
///
/// This crate drives gdb through its level-2 annotated console. It splits
/// the debugger's raw output into console text, inferior text and
/// structured updates, and schedules the internal commands that keep the
/// front end's view of breakpoints, frames and sources current.

use thiserror::Error;

pub mod commands;
pub mod config;
pub mod context;
pub mod output;
pub mod parser;
pub mod process;
pub mod reassembler;
pub mod session;
mod state_machine;
pub mod tty;
pub mod types;

pub use commands::{CommandCategory, CommandPolicy, Orchestrator};
pub use config::EngineConfig;
pub use context::{Context, Initialized};
pub use output::{OutputSink, UpdateQueue};
pub use process::{DebuggerProcess, Launched, Launcher, TokioLauncher};
pub use session::{Session, SessionEvent};
pub use tty::{AllocatedTty, InferiorEndpoints, PtyAllocator, TtyAllocator};
pub use types::*;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to start process: {0}")]
    SpawnFailure(String),
    /// The rest of the input was still processed; `outcome` is what the
    /// call would have returned without the desync.
    #[error("Protocol desync: {message}")]
    ProtocolDesync {
        message: String,
        outcome: ParseOutcome,
    },
    #[error("{stream} buffer too small: need {needed} bytes, {available} available")]
    BufferTooSmall {
        stream: Stream,
        needed: usize,
        available: usize,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Debugger is not ready for a command")]
    NotReady,
    #[error("Debugger is waiting for an answer to a question")]
    MiscPrompt,
    #[error("Context is not initialized")]
    NotInitialized,
    #[error("Context is already initialized")]
    AlreadyInitialized,
    #[error("Context has been shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, EngineError>;
