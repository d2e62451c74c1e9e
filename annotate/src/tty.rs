/// Inferior terminal allocation
///
/// The inferior gets its own pseudo-terminal so that its output never mixes
/// with the annotated stream. The context either owns the terminal (and
/// closes it when replaced or shut down) or borrows a path supplied by the
/// caller.

use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use portable_pty::{native_pty_system, PtySize};

use crate::{EngineError, Result};

/// Handles the caller uses to talk to the inferior
pub struct InferiorEndpoints {
    /// Writes reach the inferior's standard input
    pub stdin: Box<dyn Write + Send>,
    /// Reads return the inferior's output
    pub stdout: Box<dyn Read + Send>,
    /// Terminal path handed to the debugger with `tty`
    pub path: PathBuf,
}

impl fmt::Debug for InferiorEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferiorEndpoints")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A freshly allocated terminal; dropping `guard` closes it
pub struct AllocatedTty {
    pub endpoints: InferiorEndpoints,
    pub guard: Box<dyn Any + Send>,
}

/// Source of new inferior terminals
pub trait TtyAllocator: Send {
    fn allocate(&mut self) -> Result<AllocatedTty>;
}

/// Allocates terminals with the platform's native pty system
#[derive(Debug, Clone, Copy)]
pub struct PtyAllocator {
    pub rows: u16,
    pub cols: u16,
}

impl Default for PtyAllocator {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

fn pty_error<E: fmt::Display>(err: E) -> EngineError {
    EngineError::SpawnFailure(format!("pty: {}", err))
}

impl TtyAllocator for PtyAllocator {
    fn allocate(&mut self) -> Result<AllocatedTty> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: self.rows,
                cols: self.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(pty_error)?;

        let stdout = pair.master.try_clone_reader().map_err(pty_error)?;
        let stdin = pair.master.take_writer().map_err(pty_error)?;
        let path = terminal_path(pair.master.as_ref())?;
        log::debug!("Allocated inferior terminal {}", path.display());

        Ok(AllocatedTty {
            endpoints: InferiorEndpoints { stdin, stdout, path },
            // The slave stays open so reads from the master do not fail
            // before the inferior attaches.
            guard: Box::new((pair.master, pair.slave)),
        })
    }
}

#[cfg(unix)]
fn terminal_path(master: &(dyn portable_pty::MasterPty + Send)) -> Result<PathBuf> {
    master
        .tty_name()
        .ok_or_else(|| pty_error("terminal has no name"))
}

#[cfg(not(unix))]
fn terminal_path(_master: &(dyn portable_pty::MasterPty + Send)) -> Result<PathBuf> {
    Err(pty_error("named terminals are not supported on this platform"))
}

/// The terminal the inferior currently runs on
pub(crate) enum InferiorTty {
    /// Allocated by the context and closed when dropped
    Owned { path: PathBuf, _guard: Box<dyn Any + Send> },
    /// Supplied by the caller, never closed here
    Borrowed(PathBuf),
}

impl InferiorTty {
    pub fn path(&self) -> &Path {
        match self {
            InferiorTty::Owned { path, .. } => path,
            InferiorTty::Borrowed(path) => path,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, InferiorTty::Owned { .. })
    }
}

impl fmt::Debug for InferiorTty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferiorTty::Owned { path, .. } => f.debug_tuple("Owned").field(path).finish(),
            InferiorTty::Borrowed(path) => f.debug_tuple("Borrowed").field(path).finish(),
        }
    }
}
