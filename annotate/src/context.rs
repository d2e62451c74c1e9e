/// The annotation context
///
/// `Context` is the public face of the engine. It owns the protocol state
/// machine, the command orchestrator and the inferior terminal, and walks
/// through the create, initialize and shutdown lifecycle.

use std::path::{Path, PathBuf};

use crate::commands::{Orchestrator, STARTUP_COMMANDS};
use crate::config::EngineConfig;
use crate::output::{OutputSink, UpdateQueue};
use crate::process::Launcher;
use crate::state_machine::{Checkpoint, Emitted, StateMachine};
use crate::tty::{AllocatedTty, InferiorEndpoints, InferiorTty, PtyAllocator, TtyAllocator};
use crate::types::*;
use crate::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Initialized,
    ShutDown,
}

/// Everything `initialize` hands back to the caller
#[derive(Debug)]
pub struct Initialized<C> {
    pub pid: u32,
    /// The launcher's channels to the debugger
    pub debugger: C,
    /// The inferior's terminal
    pub inferior: InferiorEndpoints,
}

pub struct Context {
    config: EngineConfig,
    config_dir: PathBuf,
    args: Vec<String>,
    lifecycle: Lifecycle,
    machine: StateMachine,
    orch: Orchestrator,
    tty: Option<InferiorTty>,
    allocator: Box<dyn TtyAllocator>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("lifecycle", &self.lifecycle)
            .field("state", &self.machine.state())
            .field("tty", &self.tty)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context; nothing is started until `initialize`
    ///
    /// The configuration is read from `config_dir`. A `debugger_path`
    /// overrides the configured executable.
    pub fn create(debugger_path: Option<&Path>, args: &[String], config_dir: &Path) -> Result<Self> {
        let mut config = EngineConfig::load(config_dir)?;
        if let Some(path) = debugger_path {
            config.debugger_path = path.to_path_buf();
        }
        log::debug!("Created context for {}", config.debugger_path.display());

        Ok(Self {
            machine: StateMachine::new(&config),
            config,
            config_dir: config_dir.to_path_buf(),
            args: args.to_vec(),
            lifecycle: Lifecycle::Created,
            orch: Orchestrator::new(),
            tty: None,
            allocator: Box::new(PtyAllocator::default()),
        })
    }

    /// Replace the source of inferior terminals
    pub fn with_tty_allocator(mut self, allocator: impl TtyAllocator + 'static) -> Self {
        self.allocator = Box::new(allocator);
        self
    }

    /// Write the init file, start the debugger and give the inferior a terminal
    pub fn initialize<L: Launcher>(&mut self, launcher: &mut L) -> Result<Initialized<L::Channels>> {
        match self.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Initialized => return Err(EngineError::AlreadyInitialized),
            Lifecycle::ShutDown => return Err(EngineError::ShutDown),
        }

        let init_file = self.config_dir.join(&self.config.init_file_name);
        self.config.write_init_file(&init_file)?;

        let inferior = self.install_tty()?;

        let mut argv = vec![
            "--nx".to_string(),
            "--annotate=2".to_string(),
            "-x".to_string(),
            init_file.display().to_string(),
        ];
        argv.extend(self.args.iter().cloned());

        let launched = launcher.launch(&self.config.debugger_path, &argv)?;
        log::info!("Debugger running with PID {}", launched.pid);
        self.orch.set_debugger_pid(Some(launched.pid));

        for kind in STARTUP_COMMANDS {
            self.orch.schedule_kind(*kind);
        }
        self.lifecycle = Lifecycle::Initialized;

        Ok(Initialized {
            pid: launched.pid,
            debugger: launched.channels,
            inferior,
        })
    }

    /// Release the terminal and stop accepting work; calling it twice is fine
    pub fn shutdown(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::ShutDown {
            return Ok(());
        }
        if let Some(tty) = self.tty.take() {
            log::debug!("Releasing inferior terminal {}", tty.path().display());
        }
        self.orch = Orchestrator::new();
        self.lifecycle = Lifecycle::ShutDown;
        log::info!("Context shut down");
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Initialized => Ok(()),
            Lifecycle::Created => Err(EngineError::NotInitialized),
            Lifecycle::ShutDown => Err(EngineError::ShutDown),
        }
    }

    fn live(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The protocol state, or `None` outside the initialized lifecycle
    pub fn state(&self) -> Option<ProtocolState> {
        self.live().then(|| self.machine.state())
    }

    /// True at the main prompt with no command in flight
    pub fn is_ready(&self) -> bool {
        self.live() && self.machine.is_ready()
    }

    /// True while the debugger waits for an answer to a question
    pub fn is_misc_prompt(&self) -> bool {
        self.live() && self.machine.is_misc_prompt()
    }

    pub fn inferior_running(&self) -> bool {
        self.live() && self.machine.inferior_running()
    }

    pub fn outstanding_command(&self) -> Option<&Command> {
        if !self.live() {
            return None;
        }
        self.machine.outstanding()
    }

    pub fn byte_ledger(&self) -> Option<ByteLedger> {
        self.live().then(|| self.machine.ledger())
    }

    pub fn current_location(&self) -> Option<&Location> {
        if !self.live() {
            return None;
        }
        self.orch.location()
    }

    pub fn debugger_pid(&self) -> Option<u32> {
        if !self.live() {
            return None;
        }
        self.orch.debugger_pid()
    }

    /// Whether `disassemble /s` was accepted by the start-up query
    pub fn disassemble_mode_supported(&self) -> bool {
        self.live() && self.orch.disassemble_mode_supported()
    }

    pub fn tty_path(&self) -> Option<&Path> {
        if !self.live() {
            return None;
        }
        self.tty.as_ref().map(InferiorTty::path)
    }

    /// Commands waiting to be written; empty outside the initialized lifecycle
    pub fn pending_commands(&self) -> impl Iterator<Item = &Command> {
        self.orch.pending().filter(move |_| self.live())
    }

    /// Queue a console line typed by the user
    pub fn submit_user_command(&mut self, line: &str) -> Result<()> {
        self.ensure_live()?;
        self.orch.submit_user(line);
        Ok(())
    }

    /// Queue an internal command, e.g. a completion or a disassembly request
    pub fn request(&mut self, command: InternalCommand) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.orch.schedule(command))
    }

    /// Take the next command that may be written now, and mark it in flight
    pub fn next_command(&mut self) -> Result<Option<Command>> {
        self.ensure_live()?;

        // At a question only an answer may go out, and only one.
        let misc = self.machine.state() == ProtocolState::MiscPrompt;
        if !misc && !self.machine.is_ready() {
            return Ok(None);
        }
        let command = match self.orch.next_sendable(misc) {
            Some(command) => command,
            None => return Ok(None),
        };
        self.machine.begin_command(&command, &mut self.orch)?;
        Ok(Some(command))
    }

    /// Mark `command` as written by the caller itself
    pub fn prepare_for_command(&mut self, command: &Command) -> Result<()> {
        self.ensure_live()?;
        self.machine.begin_command(command, &mut self.orch)
    }

    /// The user ran a command directly on the debugger console
    pub fn notify_user_ran_command(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.machine.user_ran_command(&mut self.orch);
        Ok(())
    }

    /// The console line to write for `command`, without the newline
    pub fn command_text(&self, command: &Command) -> Option<String> {
        self.live()
            .then(|| self.orch.command_text(command, self.config.disassemble_count))
    }

    /// Consume a chunk of debugger output
    ///
    /// Either everything is committed or, when a sink lacks room, nothing
    /// is and `BufferTooSmall` comes back. A desync is reported after the
    /// rest of the chunk has been processed and committed.
    pub fn parse(
        &mut self,
        input: &[u8],
        debugger: &mut OutputSink,
        inferior: &mut OutputSink,
        updates: &mut impl UpdateQueue,
    ) -> Result<ParseOutcome> {
        self.ensure_live()?;

        let checkpoint = self.machine.checkpoint();
        let orch = self.orch.clone();
        let mut out = Emitted::default();
        self.machine.feed(input, &self.config, &mut self.orch, &mut out);
        self.commit(checkpoint, orch, out, debugger, inferior, updates)
    }

    /// The debugger's output reached end of file: flush what is held
    pub fn finish_input(
        &mut self,
        debugger: &mut OutputSink,
        inferior: &mut OutputSink,
        updates: &mut impl UpdateQueue,
    ) -> Result<ParseOutcome> {
        self.ensure_live()?;

        let checkpoint = self.machine.checkpoint();
        let orch = self.orch.clone();
        let mut out = Emitted::default();
        self.machine.finish(&self.config, &mut self.orch, &mut out);
        self.commit(checkpoint, orch, out, debugger, inferior, updates)
    }

    /// Hand the output of a feed to the caller, or undo the feed if it
    /// does not fit
    fn commit(
        &mut self,
        checkpoint: Checkpoint,
        orch: Orchestrator,
        out: Emitted,
        debugger: &mut OutputSink,
        inferior: &mut OutputSink,
        updates: &mut impl UpdateQueue,
    ) -> Result<ParseOutcome> {
        let room = debugger
            .check(out.debugger.len(), Stream::Debugger)
            .and_then(|_| inferior.check(out.inferior.len(), Stream::Inferior));
        if let Err(e) = room {
            self.machine.rollback(checkpoint);
            self.orch = orch;
            return Err(e);
        }

        self.machine.commit();
        debugger.append(&out.debugger);
        inferior.append(&out.inferior);
        for update in out.updates {
            updates.push(update);
        }

        let outcome = if out.completed {
            ParseOutcome::Complete
        } else {
            ParseOutcome::NeedMore
        };
        match out.desync {
            Some(message) => Err(EngineError::ProtocolDesync { message, outcome }),
            None => Ok(outcome),
        }
    }

    /// Give the inferior a fresh terminal, closing the one we owned
    pub fn open_new_tty(&mut self) -> Result<InferiorEndpoints> {
        self.ensure_live()?;
        self.install_tty()
    }

    /// Run the inferior on a terminal the caller manages
    pub fn use_inferior_tty(&mut self, path: &Path) -> Result<()> {
        self.ensure_live()?;
        self.replace_tty(InferiorTty::Borrowed(path.to_path_buf()));
        Ok(())
    }

    fn install_tty(&mut self) -> Result<InferiorEndpoints> {
        let AllocatedTty { endpoints, guard } = self.allocator.allocate()?;
        self.replace_tty(InferiorTty::Owned {
            path: endpoints.path.clone(),
            _guard: guard,
        });
        Ok(endpoints)
    }

    fn replace_tty(&mut self, tty: InferiorTty) {
        if let Some(old) = self.tty.take() {
            log::debug!(
                "Replacing inferior terminal {} ({})",
                old.path().display(),
                if old.is_owned() { "closed" } else { "left open" }
            );
        }
        self.orch.set_tty_path(Some(tty.path()));
        self.orch.cancel(AnnotateCommand::Tty);
        self.orch.schedule_kind(AnnotateCommand::Tty);
        self.tty = Some(tty);
    }
}
