/// Annotation engine types and data structures
///
/// This module defines the records that flow between the debugger's annotated
/// output stream, the engine, and the client consuming the update queue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Internal commands the engine knows how to issue and interpret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotateCommand {
    /// Get a list of breakpoints
    InfoBreakpoints,
    /// Tell the debugger where to send the inferior's output
    Tty,
    /// Complete the current console line
    Complete,
    /// Show all the sources the inferior is made of
    InfoSources,
    /// Show information on the current source file
    InfoSource,
    /// Show information on the current frame
    InfoFrame,
    /// Get disassembly for the $pc
    DisassemblePc,
    /// Get disassembly for a function
    DisassembleFunc,
    /// Ask whether `disassemble /s` (mixed source+assembly) is supported.
    ///
    /// Asked through the MI `-data-disassemble` command with mode 4; an MI
    /// `^error` reply means the mode is missing and `/m` is used instead.
    DataDisassembleModeQuery,
}

impl fmt::Display for AnnotateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnnotateCommand::InfoBreakpoints => "info-breakpoints",
            AnnotateCommand::Tty => "tty",
            AnnotateCommand::Complete => "complete",
            AnnotateCommand::InfoSources => "info-sources",
            AnnotateCommand::InfoSource => "info-source",
            AnnotateCommand::InfoFrame => "info-frame",
            AnnotateCommand::DisassemblePc => "disassemble-pc",
            AnnotateCommand::DisassembleFunc => "disassemble-func",
            AnnotateCommand::DataDisassembleModeQuery => "data-disassemble-mode-query",
        };
        write!(f, "{}", s)
    }
}

/// An internal command together with its optional argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalCommand {
    pub kind: AnnotateCommand,
    pub arg: Option<String>,
}

impl InternalCommand {
    pub fn new(kind: AnnotateCommand) -> Self {
        Self { kind, arg: None }
    }

    pub fn with_arg(kind: AnnotateCommand, arg: impl Into<String>) -> Self {
        Self {
            kind,
            arg: Some(arg.into()),
        }
    }
}

/// A command headed for the debugger's stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A console line typed by the user
    User(String),
    /// A command the engine issues on its own behalf
    Internal(InternalCommand),
}

impl Command {
    pub fn user(line: impl Into<String>) -> Self {
        Command::User(line.into())
    }

    pub fn internal(kind: AnnotateCommand) -> Self {
        Command::Internal(InternalCommand::new(kind))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Command::Internal(_))
    }
}

/// A position in the inferior's source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub address: Option<String>,
}

/// Breakpoint information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub number: String,
    pub breakpoint_type: String,
    pub disposition: String,
    pub enabled: bool,
    pub address: Option<String>,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub times: u32,
}

/// Frame information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub address: String,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// A block of disassembled instructions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disassembly {
    pub function: Option<String>,
    pub address_start: Option<u64>,
    pub address_end: Option<u64>,
    pub lines: Vec<String>,
    pub error: bool,
}

/// A semantic event recognised in the annotated stream, tagged by the
/// internal command it relates to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationEvent {
    InfoBreakpoints(Vec<Breakpoint>),
    Tty(PathBuf),
    Complete(Vec<String>),
    InfoSources(Vec<String>),
    InfoSource(Location),
    InfoFrame(Option<FrameInfo>),
    DisassemblePc(Disassembly),
    DisassembleFunc(Disassembly),
    DataDisassembleModeQuery { supported: bool },
}

impl AnnotationEvent {
    /// The internal command this event is tagged with
    pub fn command(&self) -> AnnotateCommand {
        match self {
            AnnotationEvent::InfoBreakpoints(_) => AnnotateCommand::InfoBreakpoints,
            AnnotationEvent::Tty(_) => AnnotateCommand::Tty,
            AnnotationEvent::Complete(_) => AnnotateCommand::Complete,
            AnnotationEvent::InfoSources(_) => AnnotateCommand::InfoSources,
            AnnotationEvent::InfoSource(_) => AnnotateCommand::InfoSource,
            AnnotationEvent::InfoFrame(_) => AnnotateCommand::InfoFrame,
            AnnotationEvent::DisassemblePc(_) => AnnotateCommand::DisassemblePc,
            AnnotationEvent::DisassembleFunc(_) => AnnotateCommand::DisassembleFunc,
            AnnotationEvent::DataDisassembleModeQuery { .. } => {
                AnnotateCommand::DataDisassembleModeQuery
            }
        }
    }
}

/// Structured record appended to the client's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Annotation(AnnotationEvent),
    /// The debugger's prompt text changed
    PromptChanged(String),
    InferiorStarted,
    /// The inferior exited; `None` when it was killed by a signal
    InferiorExited(Option<i32>),
    DebuggerQuit,
}

/// Result of a successful `parse` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The outstanding command finished and the debugger is back at its prompt
    Complete,
    /// Partial progress only
    NeedMore,
}

/// Non-standard prompts that suspend the internal command pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiscKind {
    Query,
    Commands,
    OverloadChoice,
    InstanceChoice,
    PromptForContinue,
}

/// Tagged blocks of the annotated stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Between `pre-prompt` and `prompt`: the prompt text
    Prompt,
    /// Between `pre-<misc>` and `<misc>`: the question shown to the user
    Question(MiscKind),
    /// Between two bare `source` markers
    Source,
    /// Between `frame-begin` and `frame-end`
    Frame,
    /// Between `breakpoints-headers` and `breakpoints-table-end`
    Breakpoints,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::Prompt => write!(f, "prompt"),
            BlockKind::Question(kind) => write!(f, "question({:?})", kind),
            BlockKind::Source => write!(f, "source"),
            BlockKind::Frame => write!(f, "frame"),
            BlockKind::Breakpoints => write!(f, "breakpoints"),
        }
    }
}

/// Where the debugger's output stream currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    AtPrompt,
    InAnnotation(BlockKind),
    MiscPrompt,
    PreCommand,
}

/// The two visible output streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Debugger,
    Inferior,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Debugger => write!(f, "debugger"),
            Stream::Inferior => write!(f, "inferior"),
        }
    }
}

/// Accounting of every byte handed to `parse`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteLedger {
    pub consumed: usize,
    pub debugger: usize,
    pub inferior: usize,
    pub discarded: usize,
    pub buffered: usize,
}

impl ByteLedger {
    pub fn is_balanced(&self) -> bool {
        self.debugger + self.inferior + self.discarded + self.buffered == self.consumed
    }
}
