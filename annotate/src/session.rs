/// Session driver
///
/// Connects a context to the debugger's standard streams: raw output is
/// parsed as it arrives, user lines are queued, and pending commands are
/// written whenever the debugger can take one.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::context::Context;
use crate::output::OutputSink;
use crate::types::{ParseOutcome, Update};
use crate::{EngineError, Result};

const READ_CHUNK: usize = 4096;

/// What the session reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Text for the debugger console
    DebuggerOutput(Vec<u8>),
    /// Inferior output that arrived on the debugger's stream
    InferiorOutput(Vec<u8>),
    Update(Update),
    /// A command completed and nothing is left to send: the user's turn
    Ready,
    /// The debugger closed its output
    Exited,
}

pub struct Session<W> {
    context: Context,
    stdin: W,
    events: mpsc::UnboundedSender<SessionEvent>,
    debugger: OutputSink,
    inferior: OutputSink,
}

impl<W: AsyncWrite + Unpin> Session<W> {
    pub fn new(context: Context, stdin: W, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            context,
            stdin,
            events,
            debugger: OutputSink::unbounded(),
            inferior: OutputSink::unbounded(),
        }
    }

    /// Drive the session until the debugger's output closes
    ///
    /// Returns the context so the caller can inspect it or shut it down.
    pub async fn run<R: AsyncRead + Unpin>(
        mut self,
        mut stdout: R,
        mut user_lines: mpsc::UnboundedReceiver<String>,
    ) -> Result<Context> {
        log::debug!("Session started");
        let mut buf = vec![0u8; READ_CHUNK];
        let mut user_closed = false;

        self.pump_commands().await?;

        loop {
            tokio::select! {
                read = stdout.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        log::debug!("Debugger output: EOF reached");
                        self.finish()?;
                        break;
                    }
                    let outcome = self.handle_output(&buf[..n])?;
                    self.pump_commands().await?;
                    if outcome == ParseOutcome::Complete && self.context.is_ready() {
                        self.send(SessionEvent::Ready);
                    }
                }
                line = user_lines.recv(), if !user_closed => {
                    match line {
                        Some(line) => {
                            log::debug!("USER: {}", line);
                            self.context.submit_user_command(&line)?;
                            self.pump_commands().await?;
                        }
                        None => user_closed = true,
                    }
                }
            }
        }

        self.send(SessionEvent::Exited);
        log::debug!("Session finished");
        Ok(self.context)
    }

    fn handle_output(&mut self, chunk: &[u8]) -> Result<ParseOutcome> {
        let mut updates = Vec::new();
        let outcome = match self
            .context
            .parse(chunk, &mut self.debugger, &mut self.inferior, &mut updates)
        {
            Ok(outcome) => outcome,
            Err(EngineError::ProtocolDesync { message, outcome }) => {
                log::warn!("Continuing after desync: {}", message);
                outcome
            }
            Err(e) => return Err(e),
        };
        self.forward(updates);
        Ok(outcome)
    }

    fn finish(&mut self) -> Result<()> {
        let mut updates = Vec::new();
        self.context
            .finish_input(&mut self.debugger, &mut self.inferior, &mut updates)?;
        self.forward(updates);
        Ok(())
    }

    fn forward(&mut self, updates: Vec<Update>) {
        if !self.debugger.is_empty() {
            let bytes = self.debugger.drain();
            self.send(SessionEvent::DebuggerOutput(bytes));
        }
        if !self.inferior.is_empty() {
            let bytes = self.inferior.drain();
            self.send(SessionEvent::InferiorOutput(bytes));
        }
        for update in updates {
            self.send(SessionEvent::Update(update));
        }
    }

    fn send(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Session event receiver dropped");
        }
    }

    /// Write every command the debugger can accept right now
    async fn pump_commands(&mut self) -> Result<()> {
        while let Some(command) = self.context.next_command()? {
            let text = self
                .context
                .command_text(&command)
                .ok_or(EngineError::ShutDown)?;
            log::debug!("SEND: {}", text);
            self.stdin.write_all(text.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await?;
        }
        Ok(())
    }
}
