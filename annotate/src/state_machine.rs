/// Protocol state machine
///
/// Follows the debugger's annotated output, routes every text span to the
/// debugger output, the inferior output or a capture buffer, and turns the
/// annotations it recognises into updates and follow-up commands.

use std::path::{Path, PathBuf};

use crate::commands::{CommandCategory, Orchestrator};
use crate::config::EngineConfig;
use crate::parser::{self, Annotation, BreakpointTable};
use crate::reassembler::{Reassembler, Span};
use crate::types::*;
use crate::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AtPrompt,
    MiscPrompt,
    PreCommand,
}

/// Output of one feed, held back until the caller knows it fits
#[derive(Debug, Default)]
pub(crate) struct Emitted {
    pub debugger: Vec<u8>,
    pub inferior: Vec<u8>,
    pub updates: Vec<Update>,
    pub completed: bool,
    pub desync: Option<String>,
}

/// A byte buffer that can be put back to how it was when `begin` ran
///
/// Appends are undone by truncation. Only the bytes held at `begin` are
/// copied, and only when a take would otherwise lose them.
#[derive(Debug, Clone, Default)]
struct StagedBytes {
    data: Vec<u8>,
    mark: Option<usize>,
    retired: Option<Vec<u8>>,
}

impl StagedBytes {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn take(&mut self) -> Vec<u8> {
        let data = std::mem::take(&mut self.data);
        if let Some(mark) = self.mark {
            if mark > 0 && self.retired.is_none() {
                self.retired = Some(data[..mark].to_vec());
            }
        }
        data
    }

    fn begin(&mut self) {
        self.mark = Some(self.data.len());
        self.retired = None;
    }

    fn commit(&mut self) {
        self.mark = None;
        self.retired = None;
    }

    fn rollback(&mut self) {
        if let Some(retired) = self.retired.take() {
            self.data = retired;
        }
        if let Some(mark) = self.mark.take() {
            self.data.truncate(mark);
        }
    }
}

/// Buffers that grow with the debugger's output
#[derive(Debug, Clone, Default)]
struct Staged {
    prompt_text: StagedBytes,
    source_payload: StagedBytes,
    capture: StagedBytes,
}

impl Staged {
    fn all(&mut self) -> [&mut StagedBytes; 3] {
        [&mut self.prompt_text, &mut self.source_payload, &mut self.capture]
    }

    fn len(&self) -> usize {
        self.prompt_text.len() + self.source_payload.len() + self.capture.len()
    }
}

/// State saved by `StateMachine::checkpoint`
pub(crate) struct Checkpoint(StateMachine);

struct Sinks<'a> {
    config: &'a EngineConfig,
    orch: &'a mut Orchestrator,
    out: &'a mut Emitted,
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    reassembler: Reassembler,
    phase: Phase,
    block: Option<BlockKind>,
    misc_prompt: bool,
    inferior_running: bool,

    // Per-command bookkeeping, reset when a command is prepared
    outstanding: Option<Command>,
    output_started: bool,
    command_failed: bool,
    location_seen: bool,
    frames_dirty: bool,
    breakpoints_reported: bool,

    last_prompt: String,
    staged: Staged,
    table: Option<BreakpointTable>,
    ledger: ByteLedger,
}

impl StateMachine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            reassembler: Reassembler::new(config.max_annotation_len),
            // Startup behaves like a command whose completion is the first prompt.
            phase: Phase::PreCommand,
            block: None,
            misc_prompt: false,
            inferior_running: false,
            outstanding: None,
            output_started: false,
            command_failed: false,
            location_seen: false,
            frames_dirty: false,
            breakpoints_reported: false,
            last_prompt: String::new(),
            staged: Staged::default(),
            table: None,
            ledger: ByteLedger::default(),
        }
    }

    pub fn state(&self) -> ProtocolState {
        if let Some(block) = self.block {
            return ProtocolState::InAnnotation(block);
        }
        match self.phase {
            Phase::AtPrompt => ProtocolState::AtPrompt,
            Phase::MiscPrompt => ProtocolState::MiscPrompt,
            Phase::PreCommand => ProtocolState::PreCommand,
        }
    }

    /// At the main prompt with nothing in flight
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::AtPrompt
            && self.block.is_none()
            && !self.misc_prompt
            && self.outstanding.is_none()
    }

    pub fn is_misc_prompt(&self) -> bool {
        self.misc_prompt
    }

    pub fn inferior_running(&self) -> bool {
        self.inferior_running
    }

    pub fn outstanding(&self) -> Option<&Command> {
        self.outstanding.as_ref()
    }

    pub fn ledger(&self) -> ByteLedger {
        ByteLedger {
            buffered: self.reassembler.buffered() + self.staged.len(),
            ..self.ledger
        }
    }

    /// Save the state so a feed can be undone
    ///
    /// The staged buffers are not copied; they record where they stood and
    /// undo their own growth on `rollback`.
    pub(crate) fn checkpoint(&mut self) -> Checkpoint {
        let staged = std::mem::take(&mut self.staged);
        let snapshot = self.clone();
        self.staged = staged;
        for buf in self.staged.all() {
            buf.begin();
        }
        Checkpoint(snapshot)
    }

    pub(crate) fn commit(&mut self) {
        for buf in self.staged.all() {
            buf.commit();
        }
    }

    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        let mut staged = std::mem::take(&mut self.staged);
        for buf in staged.all() {
            buf.rollback();
        }
        *self = checkpoint.0;
        self.staged = staged;
    }

    /// Record that `command` is about to be written to the debugger
    pub(crate) fn begin_command(&mut self, command: &Command, orch: &mut Orchestrator) -> Result<()> {
        match command {
            Command::Internal(_) if self.misc_prompt => return Err(EngineError::MiscPrompt),
            Command::User(line) if self.misc_prompt => {
                log::debug!("Answering misc prompt with {:?}", line);
                self.phase = Phase::PreCommand;
                self.output_started = false;
                if self.outstanding.is_none() {
                    self.outstanding = Some(command.clone());
                }
                return Ok(());
            }
            _ if !self.is_ready() => return Err(EngineError::NotReady),
            _ => {}
        }

        self.phase = Phase::PreCommand;
        self.reset_command(Some(command.clone()));
        if let Command::User(line) = command {
            orch.arm_post(CommandCategory::of(line).policy().post);
        }
        log::debug!("Command prepared: {:?}", command);
        Ok(())
    }

    /// The user typed a command straight into the debugger's console
    pub(crate) fn user_ran_command(&mut self, orch: &mut Orchestrator) {
        self.phase = Phase::PreCommand;
        if self.misc_prompt {
            self.output_started = false;
            return;
        }
        if self.outstanding.is_none() {
            self.reset_command(Some(Command::User(String::new())));
        }
        orch.arm_post(&[AnnotateCommand::InfoBreakpoints]);
    }

    pub(crate) fn feed(
        &mut self,
        input: &[u8],
        config: &EngineConfig,
        orch: &mut Orchestrator,
        out: &mut Emitted,
    ) {
        self.ledger.consumed += input.len();
        let mut reassembler = std::mem::take(&mut self.reassembler);
        let mut sinks = Sinks { config, orch, out };
        reassembler.feed(input, &mut |span| self.on_span(span, &mut sinks));
        self.reassembler = reassembler;
    }

    /// The stream ended: held bytes become text
    pub(crate) fn finish(&mut self, config: &EngineConfig, orch: &mut Orchestrator, out: &mut Emitted) {
        let mut reassembler = std::mem::take(&mut self.reassembler);
        let mut sinks = Sinks { config, orch, out };
        reassembler.finish(&mut |span| self.on_span(span, &mut sinks));
        self.reassembler = reassembler;
    }

    fn reset_command(&mut self, outstanding: Option<Command>) {
        self.outstanding = outstanding;
        self.output_started = false;
        self.command_failed = false;
        self.location_seen = false;
        self.frames_dirty = false;
        self.breakpoints_reported = false;
    }

    fn on_span(&mut self, span: Span<'_>, sinks: &mut Sinks<'_>) {
        match span {
            Span::Text(bytes) => self.on_text(bytes, sinks.out),
            Span::Annotation { line, framing } => {
                self.ledger.discarded += framing;
                let annotation = parser::classify(&line);
                log::trace!("Annotation {:?}", annotation);
                self.on_annotation(annotation, sinks);
            }
        }
    }

    fn on_text(&mut self, bytes: &[u8], out: &mut Emitted) {
        match self.block {
            Some(BlockKind::Prompt) => self.staged.prompt_text.extend(bytes),
            Some(BlockKind::Source) => self.staged.source_payload.extend(bytes),
            Some(BlockKind::Question(_)) => self.to_debugger(bytes, out),
            Some(BlockKind::Breakpoints) => {
                if let Some(table) = self.table.as_mut() {
                    table.push_text(bytes);
                }
                self.route_output(bytes, out);
            }
            Some(BlockKind::Frame) | None => self.route_output(bytes, out),
        }
    }

    fn capturing(&self) -> bool {
        self.phase == Phase::PreCommand
            && self.output_started
            && matches!(self.outstanding, Some(Command::Internal(_)))
    }

    fn route_output(&mut self, bytes: &[u8], out: &mut Emitted) {
        if self.capturing() {
            self.staged.capture.extend(bytes);
        } else if self.inferior_running {
            out.inferior.extend_from_slice(bytes);
            self.ledger.inferior += bytes.len();
        } else {
            self.to_debugger(bytes, out);
        }
    }

    fn to_debugger(&mut self, bytes: &[u8], out: &mut Emitted) {
        out.debugger.extend_from_slice(bytes);
        self.ledger.debugger += bytes.len();
    }

    fn on_annotation(&mut self, annotation: Annotation, sinks: &mut Sinks<'_>) {
        match annotation {
            Annotation::PrePrompt => {
                self.misc_prompt = false;
                self.open_block(BlockKind::Prompt, sinks);
            }
            Annotation::Prompt => self.on_prompt(sinks),
            Annotation::PostPrompt | Annotation::PostMisc(_) => self.on_post_prompt(sinks),
            Annotation::PreMisc(kind) => self.open_block(BlockKind::Question(kind), sinks),
            Annotation::Misc(kind) => self.on_misc_prompt(kind, sinks),
            Annotation::Source(Some(payload)) => self.on_source(&payload, sinks),
            Annotation::Source(None) => {
                if self.block == Some(BlockKind::Source) {
                    self.close_block(sinks);
                } else {
                    self.open_block(BlockKind::Source, sinks);
                }
            }
            Annotation::FrameBegin => self.open_block(BlockKind::Frame, sinks),
            Annotation::FrameEnd => self.close_matching(BlockKind::Frame, "frame-end", sinks),
            Annotation::BreakpointsHeaders => {
                self.open_block(BlockKind::Breakpoints, sinks);
                self.table = Some(BreakpointTable::default());
            }
            Annotation::BreakpointsTable => {
                if let Some(table) = self.table.as_mut() {
                    table.begin_body();
                }
            }
            Annotation::Field(index) => {
                if let Some(table) = self.table.as_mut() {
                    table.field(index);
                }
            }
            Annotation::Record => {
                if let Some(table) = self.table.as_mut() {
                    table.record();
                }
            }
            Annotation::BreakpointsTableEnd => {
                self.close_matching(BlockKind::Breakpoints, "breakpoints-table-end", sinks)
            }
            Annotation::BreakpointsInvalid => self.request(AnnotateCommand::InfoBreakpoints, sinks.orch),
            Annotation::FramesInvalid => self.frames_dirty = true,
            Annotation::Starting => {
                self.inferior_running = true;
                sinks.out.updates.push(Update::InferiorStarted);
            }
            Annotation::Stopped => self.inferior_running = false,
            Annotation::Exited(code) => {
                self.inferior_running = false;
                sinks.out.updates.push(Update::InferiorExited(code));
            }
            Annotation::Signalled => {
                self.inferior_running = false;
                sinks.out.updates.push(Update::InferiorExited(None));
            }
            Annotation::ErrorBegin | Annotation::Error => self.command_failed = true,
            Annotation::Quit => sinks.out.updates.push(Update::DebuggerQuit),
            Annotation::Unknown(name) => log::debug!("Ignoring annotation {:?}", name),
        }
    }

    fn open_block(&mut self, kind: BlockKind, sinks: &mut Sinks<'_>) {
        if let Some(old) = self.block.take() {
            log::debug!("{} block implicitly closed by {} block", old, kind);
            self.finish_block(old, sinks);
        }
        self.block = Some(kind);
    }

    fn close_block(&mut self, sinks: &mut Sinks<'_>) {
        if let Some(old) = self.block.take() {
            self.finish_block(old, sinks);
        }
    }

    fn close_matching(&mut self, kind: BlockKind, name: &str, sinks: &mut Sinks<'_>) {
        if self.block == Some(kind) {
            self.close_block(sinks);
        } else {
            let inside = self
                .block
                .map(|b| b.to_string())
                .unwrap_or_else(|| "no".into());
            self.desync(format!("{} inside {} block", name, inside), sinks.out);
        }
    }

    fn finish_block(&mut self, kind: BlockKind, sinks: &mut Sinks<'_>) {
        match kind {
            BlockKind::Prompt => {
                self.ledger.discarded += self.staged.prompt_text.take().len();
            }
            BlockKind::Source => {
                let payload = self.staged.source_payload.take();
                self.ledger.discarded += payload.len();
                self.on_source(&String::from_utf8_lossy(&payload), sinks);
            }
            BlockKind::Breakpoints => {
                if let Some(table) = self.table.take() {
                    self.breakpoints_reported = true;
                    let breakpoints = table.finish();
                    sinks
                        .out
                        .updates
                        .push(Update::Annotation(AnnotationEvent::InfoBreakpoints(breakpoints)));
                }
            }
            BlockKind::Frame | BlockKind::Question(_) => {}
        }
    }

    fn desync(&mut self, message: String, out: &mut Emitted) {
        log::warn!("Protocol desync: {}", message);
        if out.desync.is_none() {
            out.desync = Some(message);
        }
    }

    fn on_source(&mut self, payload: &str, sinks: &mut Sinks<'_>) {
        match parser::parse_source_location(payload) {
            Some(location) => self.set_location(location, sinks),
            None => log::warn!("Unparseable source annotation {:?}", payload),
        }
    }

    fn set_location(&mut self, location: Location, sinks: &mut Sinks<'_>) {
        self.location_seen = true;
        sinks.orch.set_location(location.clone());
        sinks
            .out
            .updates
            .push(Update::Annotation(AnnotationEvent::InfoSource(location)));
    }

    fn on_prompt(&mut self, sinks: &mut Sinks<'_>) {
        let text = match self.block {
            Some(BlockKind::Prompt) => {
                self.block = None;
                self.staged.prompt_text.take()
            }
            Some(other) => {
                self.desync(format!("prompt inside {} block", other), sinks.out);
                self.close_block(sinks);
                Vec::new()
            }
            None => Vec::new(),
        };

        let prompt = String::from_utf8_lossy(&text).into_owned();
        if parser::matches_confirmation(&prompt, &sinks.config.misc_prompt_patterns) {
            self.to_debugger(&text, sinks.out);
            self.enter_misc_prompt();
            return;
        }

        self.ledger.discarded += text.len();
        if !prompt.is_empty() && prompt != self.last_prompt {
            sinks.out.updates.push(Update::PromptChanged(prompt.clone()));
            self.last_prompt = prompt;
        }

        let was_busy = self.phase != Phase::AtPrompt;
        self.misc_prompt = false;
        self.phase = Phase::AtPrompt;
        if was_busy {
            self.complete_command(sinks);
            sinks.out.completed = true;
        }
    }

    fn on_misc_prompt(&mut self, kind: MiscKind, sinks: &mut Sinks<'_>) {
        match self.block {
            Some(BlockKind::Prompt) => {
                self.block = None;
                let text = self.staged.prompt_text.take();
                self.to_debugger(&text, sinks.out);
            }
            Some(BlockKind::Question(_)) => self.block = None,
            Some(_) => self.close_block(sinks),
            None => {}
        }
        log::debug!("Debugger asks a {:?} question", kind);
        self.enter_misc_prompt();
    }

    fn enter_misc_prompt(&mut self) {
        self.phase = Phase::MiscPrompt;
        self.misc_prompt = true;
    }

    fn on_post_prompt(&mut self, sinks: &mut Sinks<'_>) {
        if self.block.is_some() {
            self.close_block(sinks);
        }
        self.phase = Phase::PreCommand;
        self.output_started = true;
    }

    fn request(&self, kind: AnnotateCommand, orch: &mut Orchestrator) {
        let running = matches!(&self.outstanding, Some(Command::Internal(c)) if c.kind == kind);
        if !running {
            orch.schedule_kind(kind);
        }
    }

    fn complete_command(&mut self, sinks: &mut Sinks<'_>) {
        let finished = self.outstanding.take();
        let capture = self.staged.capture.take();
        self.ledger.discarded += capture.len();

        match &finished {
            Some(Command::Internal(command)) => self.finish_internal(command, &capture, sinks),
            Some(Command::User(line)) => {
                log::debug!("User command {:?} completed", line);
                if self.frames_dirty && !self.location_seen {
                    self.request(AnnotateCommand::InfoFrame, sinks.orch);
                }
                let post = sinks.orch.take_post();
                sinks.orch.schedule_front(post);
            }
            None => {
                log::debug!("Debugger reached its prompt");
                let post = sinks.orch.take_post();
                sinks.orch.schedule_front(post);
            }
        }

        self.reset_command(None);
    }

    fn finish_internal(&mut self, command: &InternalCommand, capture: &[u8], sinks: &mut Sinks<'_>) {
        let text = String::from_utf8_lossy(capture);
        let failed = self.command_failed;
        log::debug!("Internal command {} completed", command.kind);

        let event = match command.kind {
            AnnotateCommand::InfoBreakpoints => {
                // A table was already reported while the command ran.
                if self.breakpoints_reported {
                    None
                } else {
                    Some(AnnotationEvent::InfoBreakpoints(Vec::new()))
                }
            }
            AnnotateCommand::Tty => match (&command.arg, failed) {
                (Some(path), false) => Some(AnnotationEvent::Tty(PathBuf::from(path))),
                _ => {
                    log::warn!("Debugger did not accept tty {:?}", command.arg);
                    None
                }
            },
            AnnotateCommand::Complete => Some(AnnotationEvent::Complete(parser::parse_completions(&text))),
            AnnotateCommand::InfoSources => {
                Some(AnnotationEvent::InfoSources(parser::parse_info_sources(&text)))
            }
            AnnotateCommand::InfoSource => match parser::parse_info_source(&text) {
                Some(file) => {
                    let known = sinks.orch.location().filter(|l| same_file(&l.file, &file));
                    let location = Location {
                        line: known.map(|l| l.line).unwrap_or(1),
                        address: known.and_then(|l| l.address.clone()),
                        file,
                    };
                    sinks.orch.set_location(location.clone());
                    Some(AnnotationEvent::InfoSource(location))
                }
                None => {
                    log::debug!("No current source file");
                    None
                }
            },
            AnnotateCommand::InfoFrame => {
                let frame = parser::parse_info_frame(&text);
                if let Some(FrameInfo {
                    address,
                    file: Some(file),
                    line: Some(line),
                    ..
                }) = &frame
                {
                    sinks.orch.set_location(Location {
                        file: file.clone(),
                        line: *line,
                        address: Some(address.clone()),
                    });
                }
                Some(AnnotationEvent::InfoFrame(frame))
            }
            AnnotateCommand::DisassemblePc => Some(AnnotationEvent::DisassemblePc(
                parser::parse_disassembly(&text, None, failed),
            )),
            AnnotateCommand::DisassembleFunc => Some(AnnotationEvent::DisassembleFunc(
                parser::parse_disassembly(&text, command.arg.clone(), failed),
            )),
            AnnotateCommand::DataDisassembleModeQuery => {
                let supported = !failed && parser::parse_mode_query(&text);
                sinks.orch.set_disassemble_mode_supported(supported);
                Some(AnnotationEvent::DataDisassembleModeQuery { supported })
            }
        };

        if let Some(event) = event {
            sinks.out.updates.push(Update::Annotation(event));
        }
    }
}

fn same_file(a: &str, b: &str) -> bool {
    a == b || Path::new(a).file_name() == Path::new(b).file_name()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        machine: StateMachine,
        config: EngineConfig,
        orch: Orchestrator,
    }

    impl Harness {
        fn new() -> Self {
            let config = EngineConfig::default();
            Self {
                machine: StateMachine::new(&config),
                config,
                orch: Orchestrator::new(),
            }
        }

        fn feed(&mut self, input: &[u8]) -> Emitted {
            let mut out = Emitted::default();
            self.machine.feed(input, &self.config, &mut self.orch, &mut out);
            out
        }

        fn at_prompt() -> Self {
            let mut h = Self::new();
            h.feed(b"\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n");
            h.orch = Orchestrator::new();
            h
        }

        fn run(&mut self, command: Command) {
            self.machine.begin_command(&command, &mut self.orch).unwrap();
        }
    }

    #[test]
    fn test_first_prompt_completes_startup() {
        let mut h = Harness::new();
        assert_eq!(h.machine.state(), ProtocolState::PreCommand);
        assert!(!h.machine.is_ready());

        let out = h.feed(b"GNU gdb 13\n\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n");
        assert!(out.completed);
        assert_eq!(out.debugger, b"GNU gdb 13".to_vec());
        assert_eq!(out.updates, vec![Update::PromptChanged("(gdb) ".into())]);
        assert!(h.machine.is_ready());
        assert!(h.machine.ledger().is_balanced());
    }

    #[test]
    fn test_source_annotation_updates_location() {
        let mut h = Harness::at_prompt();
        h.feed(b"\x1a\x1asource /tmp/main.c:12:130:beg:0x401136\n");
        let location = Location {
            file: "/tmp/main.c".into(),
            line: 12,
            address: Some("0x401136".into()),
        };
        assert_eq!(h.orch.location(), Some(&location));
    }

    #[test]
    fn test_source_block_payload() {
        let mut h = Harness::at_prompt();
        let out = h.feed(b"\x1a\x1asource\n/tmp/a.c:3:10:beg:0x10\n\x1a\x1asource\n");
        assert_eq!(
            out.updates,
            vec![Update::Annotation(AnnotationEvent::InfoSource(Location {
                file: "/tmp/a.c".into(),
                line: 3,
                address: Some("0x10".into()),
            }))]
        );
        assert!(out.debugger.is_empty());
    }

    #[test]
    fn test_query_is_misc_prompt() {
        let mut h = Harness::at_prompt();
        let out = h.feed(b"\x1a\x1apre-query\nDelete all? (y or n) \n\x1a\x1aquery\n");
        assert_eq!(out.debugger, b"Delete all? (y or n) ".to_vec());
        assert!(h.machine.is_misc_prompt());
        assert_eq!(h.machine.state(), ProtocolState::MiscPrompt);

        let internal = Command::internal(AnnotateCommand::InfoFrame);
        assert!(matches!(
            h.machine.begin_command(&internal, &mut h.orch),
            Err(EngineError::MiscPrompt)
        ));
        h.run(Command::user("y"));

        h.feed(b"\x1a\x1apost-query\n\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n");
        assert!(!h.machine.is_misc_prompt());
        assert!(h.machine.is_ready());
    }

    #[test]
    fn test_confirmation_pattern_in_prompt_text() {
        let mut h = Harness::at_prompt();
        let out = h.feed(b"\x1a\x1apre-prompt\nQuit anyway? (y or n) \n\x1a\x1aprompt\n");
        assert_eq!(out.debugger, b"Quit anyway? (y or n) ".to_vec());
        assert!(h.machine.is_misc_prompt());
        assert!(!out.completed);
    }

    #[test]
    fn test_not_ready_rejects_commands() {
        let mut h = Harness::new();
        assert!(matches!(
            h.machine.begin_command(&Command::user("next"), &mut h.orch),
            Err(EngineError::NotReady)
        ));
    }

    #[test]
    fn test_inferior_output_between_starting_and_stopped() {
        let mut h = Harness::at_prompt();
        h.run(Command::user("run"));
        let out = h.feed(
            b"\x1a\x1apost-prompt\nStarting program\n\x1a\x1astarting\nhello\n\x1a\x1astopped\nBreakpoint 1\n",
        );
        // Newlines ahead of an annotation belong to the annotation.
        assert_eq!(out.debugger, b"Starting programBreakpoint 1".to_vec());
        assert_eq!(out.inferior, b"hello".to_vec());
        assert_eq!(out.updates, vec![Update::InferiorStarted]);
    }

    #[test]
    fn test_exit_and_signal_updates() {
        let mut h = Harness::at_prompt();
        let out = h.feed(b"\x1a\x1astarting\n\x1a\x1aexited 3\n\x1a\x1asignalled\n\x1a\x1aquit\n");
        assert_eq!(
            out.updates,
            vec![
                Update::InferiorStarted,
                Update::InferiorExited(Some(3)),
                Update::InferiorExited(None),
                Update::DebuggerQuit,
            ]
        );
        assert!(!h.machine.inferior_running());
    }

    #[test]
    fn test_internal_command_output_is_captured() {
        let mut h = Harness::at_prompt();
        h.run(Command::internal(AnnotateCommand::InfoSource));
        let out = h.feed(
            b"\x1a\x1apost-prompt\nCurrent source file is main.c\nLocated in /src/main.c\n\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n",
        );
        assert!(out.debugger.is_empty());
        assert!(out.completed);
        assert_eq!(
            out.updates,
            vec![Update::Annotation(AnnotationEvent::InfoSource(Location {
                file: "/src/main.c".into(),
                line: 1,
                address: None,
            }))]
        );
        assert!(h.machine.is_ready());
        assert!(h.machine.ledger().is_balanced());
    }

    #[test]
    fn test_breakpoints_invalid_schedules_refresh() {
        let mut h = Harness::at_prompt();
        h.run(Command::user("print 1"));
        h.feed(b"\x1a\x1apost-prompt\n\x1a\x1abreakpoints-invalid\n$1 = 1\n");
        assert_eq!(
            h.orch.pending().cloned().collect::<Vec<_>>(),
            vec![Command::internal(AnnotateCommand::InfoBreakpoints)]
        );
    }

    #[test]
    fn test_breakpoint_table_reported_once() {
        let mut h = Harness::at_prompt();
        h.run(Command::internal(AnnotateCommand::InfoBreakpoints));
        let out = h.feed(
            b"\x1a\x1apost-prompt\n\x1a\x1abreakpoints-headers\nNum Type\n\x1a\x1abreakpoints-table\n\
\x1a\x1arecord\n\x1a\x1afield 0\n1       \x1a\x1afield 1\nbreakpoint     \x1a\x1afield 2\nkeep \
\x1a\x1afield 3\ny   \x1a\x1afield 4\n0x0000000000401136 \x1a\x1afield 5\nin main at main.c:5\n\
\x1a\x1abreakpoints-table-end\n\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n",
        );
        let tables: Vec<_> = out
            .updates
            .iter()
            .filter_map(|u| match u {
                Update::Annotation(AnnotationEvent::InfoBreakpoints(list)) => Some(list.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].len(), 1);
        assert_eq!(tables[0][0].number, "1");
        assert!(out.debugger.is_empty());
    }

    #[test]
    fn test_empty_breakpoint_list() {
        let mut h = Harness::at_prompt();
        h.run(Command::internal(AnnotateCommand::InfoBreakpoints));
        let out = h.feed(
            b"\x1a\x1apost-prompt\nNo breakpoints or watchpoints.\n\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n",
        );
        assert_eq!(
            out.updates,
            vec![Update::Annotation(AnnotationEvent::InfoBreakpoints(Vec::new()))]
        );
    }

    #[test]
    fn test_user_command_arms_follow_ups() {
        let mut h = Harness::at_prompt();
        h.run(Command::user("next"));
        h.feed(b"\x1a\x1apost-prompt\n\x1a\x1aframes-invalid\n\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n");
        assert_eq!(
            h.orch.pending().cloned().collect::<Vec<_>>(),
            vec![
                Command::internal(AnnotateCommand::InfoBreakpoints),
                Command::internal(AnnotateCommand::InfoFrame),
            ]
        );
    }

    #[test]
    fn test_frame_end_without_begin_is_desync() {
        let mut h = Harness::at_prompt();
        let out = h.feed(b"\x1a\x1aframe-end\n");
        assert!(out.desync.is_some());
        assert!(h.machine.is_ready());
    }

    #[test]
    fn test_prompt_inside_frame_block_resyncs() {
        let mut h = Harness::at_prompt();
        h.run(Command::user("bt"));
        let out = h.feed(b"\x1a\x1apost-prompt\n\x1a\x1aframe-begin 0 0x1\n#0 main\n\x1a\x1aprompt\n");
        assert!(out.desync.is_some());
        assert!(out.completed);
        assert!(h.machine.is_ready());
    }

    #[test]
    fn test_staged_bytes_rollback() {
        let mut buf = StagedBytes::default();
        buf.extend(b"held");
        buf.begin();
        buf.extend(b" more");
        assert_eq!(buf.take(), b"held more".to_vec());
        buf.extend(b"next");
        buf.rollback();
        assert_eq!(buf.data, b"held".to_vec());

        buf.begin();
        buf.extend(b"!");
        buf.commit();
        buf.rollback();
        assert_eq!(buf.data, b"held!".to_vec());
    }

    #[test]
    fn test_rollback_undoes_completed_capture() {
        let mut h = Harness::at_prompt();
        h.run(Command::internal(AnnotateCommand::InfoSource));
        h.feed(b"\x1a\x1apost-prompt\nLocated in /src/ma");
        let ledger = h.machine.ledger();
        let rest = b"in.c\n\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n";

        let checkpoint = h.machine.checkpoint();
        assert!(h.feed(rest).completed);
        assert!(h.machine.is_ready());
        h.machine.rollback(checkpoint);
        assert_eq!(h.machine.ledger(), ledger);
        assert_eq!(h.machine.state(), ProtocolState::PreCommand);

        let out = h.feed(rest);
        assert_eq!(
            out.updates,
            vec![Update::Annotation(AnnotationEvent::InfoSource(Location {
                file: "/src/main.c".into(),
                line: 1,
                address: None,
            }))]
        );
    }

    #[test]
    fn test_user_ran_command_arms_breakpoint_refresh() {
        let mut h = Harness::at_prompt();
        h.machine.user_ran_command(&mut h.orch);
        assert_eq!(h.machine.state(), ProtocolState::PreCommand);
        h.feed(b"\x1a\x1apost-prompt\n\x1a\x1apre-prompt\n(gdb) \n\x1a\x1aprompt\n");
        assert_eq!(
            h.orch.pending().cloned().collect::<Vec<_>>(),
            vec![Command::internal(AnnotateCommand::InfoBreakpoints)]
        );
    }
}
