/// Command orchestration
///
/// This module decides which internal commands accompany a user command,
/// owns the outbound command pipeline, and renders commands as the console
/// lines written to the debugger.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::types::*;

/// Coarse classification of user commands, keyed by their first word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    /// Starts the inferior
    Launch,
    /// Resumes or stops a running inferior
    Resume,
    /// Changes the breakpoint list
    Breakpoints,
    /// Selects another frame
    Frame,
    /// Loads symbols or a core
    Symbols,
    Other,
}

/// Internal commands issued around a user command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPolicy {
    pub pre: &'static [AnnotateCommand],
    pub post: &'static [AnnotateCommand],
}

const NO_POLICY: CommandPolicy = CommandPolicy { pre: &[], post: &[] };

const POLICIES: &[(CommandCategory, CommandPolicy)] = &[
    (
        CommandCategory::Launch,
        CommandPolicy {
            pre: &[AnnotateCommand::Tty],
            post: &[AnnotateCommand::InfoBreakpoints, AnnotateCommand::InfoFrame],
        },
    ),
    (
        CommandCategory::Resume,
        CommandPolicy {
            pre: &[],
            post: &[AnnotateCommand::InfoBreakpoints, AnnotateCommand::InfoFrame],
        },
    ),
    (
        CommandCategory::Breakpoints,
        CommandPolicy {
            pre: &[],
            post: &[AnnotateCommand::InfoBreakpoints],
        },
    ),
    (
        CommandCategory::Frame,
        CommandPolicy {
            pre: &[],
            post: &[AnnotateCommand::InfoFrame],
        },
    ),
    (
        CommandCategory::Symbols,
        CommandPolicy {
            pre: &[],
            post: &[
                AnnotateCommand::InfoSources,
                AnnotateCommand::InfoSource,
                AnnotateCommand::InfoBreakpoints,
            ],
        },
    ),
];

const KEYWORDS: &[(&str, CommandCategory)] = &[
    ("r", CommandCategory::Launch),
    ("run", CommandCategory::Launch),
    ("start", CommandCategory::Launch),
    ("starti", CommandCategory::Launch),
    ("c", CommandCategory::Resume),
    ("cont", CommandCategory::Resume),
    ("continue", CommandCategory::Resume),
    ("fg", CommandCategory::Resume),
    ("s", CommandCategory::Resume),
    ("step", CommandCategory::Resume),
    ("n", CommandCategory::Resume),
    ("next", CommandCategory::Resume),
    ("si", CommandCategory::Resume),
    ("stepi", CommandCategory::Resume),
    ("ni", CommandCategory::Resume),
    ("nexti", CommandCategory::Resume),
    ("fin", CommandCategory::Resume),
    ("finish", CommandCategory::Resume),
    ("u", CommandCategory::Resume),
    ("until", CommandCategory::Resume),
    ("advance", CommandCategory::Resume),
    ("j", CommandCategory::Resume),
    ("jump", CommandCategory::Resume),
    ("signal", CommandCategory::Resume),
    ("k", CommandCategory::Resume),
    ("kill", CommandCategory::Resume),
    ("b", CommandCategory::Breakpoints),
    ("br", CommandCategory::Breakpoints),
    ("break", CommandCategory::Breakpoints),
    ("tbreak", CommandCategory::Breakpoints),
    ("rbreak", CommandCategory::Breakpoints),
    ("d", CommandCategory::Breakpoints),
    ("delete", CommandCategory::Breakpoints),
    ("clear", CommandCategory::Breakpoints),
    ("en", CommandCategory::Breakpoints),
    ("enable", CommandCategory::Breakpoints),
    ("dis", CommandCategory::Breakpoints),
    ("disable", CommandCategory::Breakpoints),
    ("condition", CommandCategory::Breakpoints),
    ("ignore", CommandCategory::Breakpoints),
    ("watch", CommandCategory::Breakpoints),
    ("rwatch", CommandCategory::Breakpoints),
    ("awatch", CommandCategory::Breakpoints),
    ("up", CommandCategory::Frame),
    ("down", CommandCategory::Frame),
    ("f", CommandCategory::Frame),
    ("frame", CommandCategory::Frame),
    ("file", CommandCategory::Symbols),
    ("exec-file", CommandCategory::Symbols),
    ("symbol-file", CommandCategory::Symbols),
    ("add-symbol-file", CommandCategory::Symbols),
    ("core", CommandCategory::Symbols),
    ("core-file", CommandCategory::Symbols),
];

impl CommandCategory {
    /// Classify a console line by its first word
    pub fn of(line: &str) -> Self {
        let word = line.split_whitespace().next().unwrap_or("");
        KEYWORDS
            .iter()
            .find(|(keyword, _)| *keyword == word)
            .map(|(_, category)| *category)
            .unwrap_or(CommandCategory::Other)
    }

    pub fn policy(self) -> CommandPolicy {
        POLICIES
            .iter()
            .find(|(category, _)| *category == self)
            .map(|(_, policy)| *policy)
            .unwrap_or(NO_POLICY)
    }
}

/// Commands issued once the debugger first reaches its prompt
pub const STARTUP_COMMANDS: &[AnnotateCommand] = &[
    AnnotateCommand::DataDisassembleModeQuery,
    AnnotateCommand::InfoSource,
];

/// Outbound pipeline plus the session facts the orchestrator tracks
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    pipeline: VecDeque<Command>,
    armed_post: Vec<AnnotateCommand>,
    tty_path: Option<PathBuf>,
    debugger_pid: Option<u32>,
    location: Option<Location>,
    disassemble_mode_supported: bool,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a user command behind the internal commands its policy needs first
    pub fn submit_user(&mut self, line: &str) {
        let policy = CommandCategory::of(line).policy();
        for kind in policy.pre {
            if let Some(command) = self.resolve(*kind) {
                self.schedule(command);
            }
        }
        self.pipeline.push_back(Command::User(line.to_string()));
    }

    /// Queue an internal command unless an identical one is already pending
    pub fn schedule(&mut self, command: InternalCommand) -> bool {
        if self.is_pending(&command) {
            return false;
        }
        log::debug!("Scheduling internal command {}", command.kind);
        self.pipeline.push_back(Command::Internal(command));
        true
    }

    pub fn schedule_kind(&mut self, kind: AnnotateCommand) -> bool {
        match self.resolve(kind) {
            Some(command) => self.schedule(command),
            None => false,
        }
    }

    /// Put commands at the head of the pipeline, keeping their order
    pub fn schedule_front(&mut self, commands: Vec<InternalCommand>) {
        for command in commands.into_iter().rev() {
            self.pipeline
                .retain(|pending| !matches!(pending, Command::Internal(c) if *c == command));
            log::debug!("Scheduling follow-up command {}", command.kind);
            self.pipeline.push_front(Command::Internal(command));
        }
    }

    /// Drop pending internal commands of one kind
    pub fn cancel(&mut self, kind: AnnotateCommand) {
        self.pipeline
            .retain(|pending| !matches!(pending, Command::Internal(c) if c.kind == kind));
    }

    /// Remember the follow-up commands for the command about to run
    pub fn arm_post(&mut self, post: &[AnnotateCommand]) {
        for kind in post {
            if !self.armed_post.contains(kind) {
                self.armed_post.push(*kind);
            }
        }
    }

    /// Follow-up commands of the command that just completed
    pub fn take_post(&mut self) -> Vec<InternalCommand> {
        std::mem::take(&mut self.armed_post)
            .into_iter()
            .filter_map(|kind| self.resolve(kind))
            .collect()
    }

    /// Next command that may be sent; only user commands leave at a misc prompt
    pub fn next_sendable(&mut self, misc_prompt: bool) -> Option<Command> {
        if misc_prompt {
            let position = self.pipeline.iter().position(|c| !c.is_internal())?;
            self.pipeline.remove(position)
        } else {
            self.pipeline.pop_front()
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &Command> {
        self.pipeline.iter()
    }

    fn is_pending(&self, command: &InternalCommand) -> bool {
        self.pipeline
            .iter()
            .any(|pending| matches!(pending, Command::Internal(c) if c == command))
    }

    fn resolve(&self, kind: AnnotateCommand) -> Option<InternalCommand> {
        match kind {
            AnnotateCommand::Tty => self
                .tty_path
                .as_ref()
                .map(|path| InternalCommand::with_arg(kind, path.display().to_string())),
            _ => Some(InternalCommand::new(kind)),
        }
    }

    /// Render a command as the console line written to the debugger
    pub fn command_text(&self, command: &Command, disassemble_count: u32) -> String {
        let internal = match command {
            Command::User(line) => return line.clone(),
            Command::Internal(internal) => internal,
        };
        let arg = internal.arg.as_deref().unwrap_or("");

        match internal.kind {
            AnnotateCommand::InfoBreakpoints => "server info breakpoints".into(),
            AnnotateCommand::Tty => format!("server tty {}", arg),
            AnnotateCommand::Complete => format!("server complete {}", arg),
            AnnotateCommand::InfoSources => "server info sources".into(),
            AnnotateCommand::InfoSource => "server info source".into(),
            AnnotateCommand::InfoFrame => "server info frame".into(),
            AnnotateCommand::DisassemblePc => format!("server x/{}i $pc", disassemble_count),
            AnnotateCommand::DisassembleFunc => {
                let mode = if self.disassemble_mode_supported { "/s" } else { "/m" };
                format!("server disassemble {} {}", mode, arg).trim_end().to_string()
            }
            AnnotateCommand::DataDisassembleModeQuery => {
                "server interpreter-exec mi \"-data-disassemble -s 0 -e 0 -- 4\"".into()
            }
        }
    }

    pub fn set_tty_path(&mut self, path: Option<&Path>) {
        self.tty_path = path.map(Path::to_path_buf);
    }

    pub fn set_debugger_pid(&mut self, pid: Option<u32>) {
        self.debugger_pid = pid;
    }

    pub fn debugger_pid(&self) -> Option<u32> {
        self.debugger_pid
    }

    pub fn set_location(&mut self, location: Location) {
        self.location = Some(location);
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn set_disassemble_mode_supported(&mut self, supported: bool) {
        self.disassemble_mode_supported = supported;
    }

    pub fn disassemble_mode_supported(&self) -> bool {
        self.disassemble_mode_supported
    }
}
