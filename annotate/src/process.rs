/// Debugger process management
///
/// Launching is behind the `Launcher` trait so the context can be driven
/// without a real debugger. `TokioLauncher` spawns the debugger with piped
/// standard streams; interrupting it is platform specific.

use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::{EngineError, Result};

/// A started debugger: its pid plus whatever channels the launcher provides
#[derive(Debug)]
pub struct Launched<C> {
    pub pid: u32,
    pub channels: C,
}

/// Starts the debugger process
pub trait Launcher {
    type Channels;

    fn launch(&mut self, program: &Path, args: &[String]) -> Result<Launched<Self::Channels>>;
}

/// Spawns the debugger as a tokio child process
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLauncher;

impl Launcher for TokioLauncher {
    type Channels = DebuggerProcess;

    fn launch(&mut self, program: &Path, args: &[String]) -> Result<Launched<DebuggerProcess>> {
        let process = DebuggerProcess::start(program, args)?;
        let pid = process
            .id()
            .ok_or_else(|| EngineError::SpawnFailure("debugger exited immediately".into()))?;
        Ok(Launched {
            pid,
            channels: process,
        })
    }
}

#[derive(Debug)]
pub struct DebuggerProcess {
    child: Child,
}

impl DebuggerProcess {
    /// Start the debugger with piped standard streams
    pub fn start(program: &Path, args: &[String]) -> Result<Self> {
        log::debug!("Starting debugger: {} {}", program.display(), args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::SpawnFailure(format!("{}: {}", program.display(), e)))?;

        log::debug!("Debugger started with PID: {:?}", child.id());

        Ok(DebuggerProcess { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Interrupt the debugger, stopping a running inferior
    pub fn interrupt(&self) -> Result<()> {
        match self.id() {
            Some(pid) => {
                log::debug!("Sending interrupt to debugger PID: {}", pid);
                send_interrupt_signal(pid)
            }
            None => Err(EngineError::ShutDown),
        }
    }

    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }

    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        Ok(self.child.wait().await?)
    }
}

#[cfg(unix)]
fn send_interrupt_signal(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(|e| {
        log::error!("Failed to send SIGINT to PID {}: {}", pid, e);
        EngineError::Io(std::io::Error::from(e))
    })
}

#[cfg(windows)]
fn send_interrupt_signal(pid: u32) -> Result<()> {
    use winapi::um::wincon::{GenerateConsoleCtrlEvent, CTRL_C_EVENT};

    let result = unsafe { GenerateConsoleCtrlEvent(CTRL_C_EVENT, pid) };
    if result == 0 {
        log::error!("GenerateConsoleCtrlEvent failed for PID {}", pid);
        return Err(EngineError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(any(windows, unix)))]
fn send_interrupt_signal(_pid: u32) -> Result<()> {
    Err(EngineError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "interrupt not supported on this platform",
    )))
}
