/// Annotation classifier and payload parsers
///
/// This module maps annotation lines to semantic tags and turns the text
/// produced by internal commands into structured data.

use crate::types::*;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// A classified annotation line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    PrePrompt,
    Prompt,
    PostPrompt,
    PreMisc(MiscKind),
    Misc(MiscKind),
    PostMisc(MiscKind),
    /// `source`, with its `FILE:LINE:CHAR:MIDDLE:ADDR` arguments when present
    Source(Option<String>),
    FrameBegin,
    FrameEnd,
    BreakpointsHeaders,
    BreakpointsTable,
    BreakpointsTableEnd,
    Field(u32),
    Record,
    BreakpointsInvalid,
    FramesInvalid,
    Starting,
    Stopped,
    Exited(Option<i32>),
    Signalled,
    ErrorBegin,
    Error,
    Quit,
    Unknown(String),
}

const MISC_PROMPTS: &[(&str, MiscKind)] = &[
    ("query", MiscKind::Query),
    ("commands", MiscKind::Commands),
    ("overload-choice", MiscKind::OverloadChoice),
    ("instance-choice", MiscKind::InstanceChoice),
    ("prompt-for-continue", MiscKind::PromptForContinue),
];

/// Classify the text that followed an annotation marker
pub fn classify(line: &str) -> Annotation {
    let line = line.trim_end_matches(['\r', '\n']);
    let (name, args) = match line.split_once(' ') {
        Some((name, args)) => (name, Some(args.trim())),
        None => (line, None),
    };

    if let Some(kind) = misc_kind(name) {
        return Annotation::Misc(kind);
    }
    if let Some(kind) = name.strip_prefix("pre-").and_then(misc_kind) {
        return Annotation::PreMisc(kind);
    }
    if let Some(kind) = name.strip_prefix("post-").and_then(misc_kind) {
        return Annotation::PostMisc(kind);
    }

    match name {
        "pre-prompt" => Annotation::PrePrompt,
        "prompt" => Annotation::Prompt,
        "post-prompt" => Annotation::PostPrompt,
        "source" => Annotation::Source(args.filter(|a| !a.is_empty()).map(str::to_string)),
        "frame-begin" => Annotation::FrameBegin,
        "frame-end" => Annotation::FrameEnd,
        "breakpoints-headers" => Annotation::BreakpointsHeaders,
        "breakpoints-table" => Annotation::BreakpointsTable,
        "breakpoints-table-end" => Annotation::BreakpointsTableEnd,
        "field" => match args.and_then(|a| a.parse().ok()) {
            Some(index) => Annotation::Field(index),
            None => Annotation::Unknown(line.to_string()),
        },
        "record" => Annotation::Record,
        "breakpoints-invalid" => Annotation::BreakpointsInvalid,
        "frames-invalid" => Annotation::FramesInvalid,
        "starting" => Annotation::Starting,
        "stopped" => Annotation::Stopped,
        "exited" => Annotation::Exited(args.and_then(|a| a.parse().ok())),
        "signalled" => Annotation::Signalled,
        "error-begin" => Annotation::ErrorBegin,
        "error" => Annotation::Error,
        "quit" => Annotation::Quit,
        _ => Annotation::Unknown(line.to_string()),
    }
}

fn misc_kind(name: &str) -> Option<MiscKind> {
    MISC_PROMPTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, kind)| *kind)
}

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| {
        Regex::new(pattern)
            .map_err(|e| log::error!("Invalid pattern {}: {}", pattern, e))
            .ok()
    })
    .as_ref()
}

/// Parse a `source` payload: `FILE:LINE:CHARACTER:MIDDLE:ADDR`
pub fn parse_source_location(payload: &str) -> Option<Location> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached(&RE, r"^(.+):(\d+):(\d+):(beg|middle):(0x[0-9a-fA-F]+)$")?;

    let caps = re.captures(payload.trim())?;
    let line = caps.get(2)?.as_str().parse().ok()?;

    Some(Location {
        file: caps.get(1)?.as_str().to_string(),
        line,
        address: caps.get(5).map(|m| m.as_str().to_string()),
    })
}

/// Parse `info source` output into the absolute path of the current file
pub fn parse_info_source(text: &str) -> Option<String> {
    let mut current = None;

    for line in text.lines().map(str::trim) {
        if let Some(path) = line.strip_prefix("Located in ") {
            return Some(path.to_string());
        }
        if let Some(file) = line.strip_prefix("Current source file is ") {
            current = Some(file.to_string());
        }
    }

    current
}

/// Parse `info sources` output into a deduplicated list of files
pub fn parse_info_sources(text: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.ends_with(':') || line.starts_with('(') {
            continue;
        }
        for file in line.split(", ").map(str::trim).filter(|f| !f.is_empty()) {
            if seen.insert(file) {
                files.push(file.to_string());
            }
        }
    }

    files
}

/// Parse `info frame` output
pub fn parse_info_frame(text: &str) -> Option<FrameInfo> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached(
        &RE,
        r"(?m)^\s*\w+ = (0x[0-9a-fA-F]+)(?: in ([^\s(]+))?(?: \((.+):(\d+)\))?",
    )?;

    let caps = re.captures(text)?;

    Some(FrameInfo {
        address: caps.get(1)?.as_str().to_string(),
        function: caps.get(2).map(|m| m.as_str().to_string()),
        file: caps.get(3).map(|m| m.as_str().to_string()),
        line: caps.get(4).and_then(|m| m.as_str().parse().ok()),
    })
}

/// Parse `complete` output: one candidate per line
pub fn parse_completions(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `disassemble` or `x/i` output
pub fn parse_disassembly(text: &str, function: Option<String>, failed: bool) -> Disassembly {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let address = cached(&RE, r"^(?:=>)?\s*(0x[0-9a-fA-F]+)");

    let mut disassembly = Disassembly {
        function,
        error: failed,
        ..Disassembly::default()
    };

    for line in text.lines().map(|l| l.trim_end_matches('\r')) {
        if line.trim().is_empty()
            || line.starts_with("Dump of assembler code")
            || line.starts_with("End of assembler dump")
        {
            continue;
        }

        let addr = address
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .and_then(|m| u64::from_str_radix(m.as_str().trim_start_matches("0x"), 16).ok());

        if let Some(addr) = addr {
            disassembly.address_start.get_or_insert(addr);
            disassembly.address_end = Some(addr);
        }

        disassembly.lines.push(line.to_string());
    }

    // Text without a single instruction is an error message.
    if disassembly.address_start.is_none() && !disassembly.lines.is_empty() {
        disassembly.error = true;
    }

    disassembly
}

/// Interpret the reply to the mixed source+assembly capability query
pub fn parse_mode_query(text: &str) -> bool {
    text.lines().any(|l| l.trim_start().starts_with("^done"))
}

/// Whether prompt text is one of the confirmation questions
pub fn matches_confirmation(text: &str, patterns: &[String]) -> bool {
    let text = text.trim_end();
    patterns
        .iter()
        .any(|p| !p.trim().is_empty() && text.ends_with(p.trim_end()))
}

/// Collects the `field N` values of a breakpoint table
#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    in_body: bool,
    rows: Vec<Vec<(u32, String)>>,
    field: Option<u32>,
}

impl BreakpointTable {
    /// Header fields are over, rows follow
    pub fn begin_body(&mut self) {
        self.in_body = true;
        self.field = None;
    }

    pub fn record(&mut self) {
        if self.in_body {
            self.rows.push(Vec::new());
            self.field = None;
        }
    }

    pub fn field(&mut self, index: u32) {
        if let Some(row) = self.rows.last_mut() {
            row.push((index, String::new()));
            self.field = Some(index);
        }
    }

    pub fn push_text(&mut self, bytes: &[u8]) {
        if self.field.is_none() {
            return;
        }
        if let Some((_, value)) = self.rows.last_mut().and_then(|row| row.last_mut()) {
            value.push_str(&String::from_utf8_lossy(bytes));
        }
    }

    pub fn finish(self) -> Vec<Breakpoint> {
        self.rows
            .iter()
            .filter_map(|row| parse_breakpoint_row(row))
            .collect()
    }
}

/// Build a breakpoint from one table row of `(field index, text)` pairs
pub fn parse_breakpoint_row(row: &[(u32, String)]) -> Option<Breakpoint> {
    static LOCATION: OnceLock<Option<Regex>> = OnceLock::new();
    static FUNCTION: OnceLock<Option<Regex>> = OnceLock::new();
    static HITS: OnceLock<Option<Regex>> = OnceLock::new();

    let get = |index: u32| {
        row.iter()
            .find(|(i, _)| *i == index)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    };

    let number = get(0)?.to_string();
    let mut breakpoint = Breakpoint {
        number,
        breakpoint_type: get(1).unwrap_or_default().to_string(),
        disposition: get(2).unwrap_or_default().to_string(),
        enabled: get(3) == Some("y"),
        address: get(4).filter(|a| a.starts_with("0x")).map(str::to_string),
        ..Breakpoint::default()
    };

    let rest: String = row
        .iter()
        .filter(|(i, _)| *i >= 5)
        .map(|(_, v)| v.as_str())
        .collect();

    if let Some(caps) = cached(&LOCATION, r" at (.+):(\d+)").and_then(|re| re.captures(&rest)) {
        breakpoint.file = caps.get(1).map(|m| m.as_str().to_string());
        breakpoint.line = caps.get(2).and_then(|m| m.as_str().parse().ok());
    }
    if let Some(caps) = cached(&FUNCTION, r"(?:^|\s)in (\S+)").and_then(|re| re.captures(&rest)) {
        breakpoint.function = caps.get(1).map(|m| m.as_str().to_string());
    }
    if let Some(caps) = cached(&HITS, r"already hit (\d+) time").and_then(|re| re.captures(&rest)) {
        breakpoint.times = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    }

    Some(breakpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prompt_family() {
        assert_eq!(classify("pre-prompt"), Annotation::PrePrompt);
        assert_eq!(classify("prompt"), Annotation::Prompt);
        assert_eq!(classify("post-prompt\r"), Annotation::PostPrompt);
        assert_eq!(classify("pre-query"), Annotation::PreMisc(MiscKind::Query));
        assert_eq!(classify("query"), Annotation::Misc(MiscKind::Query));
        assert_eq!(
            classify("post-prompt-for-continue"),
            Annotation::PostMisc(MiscKind::PromptForContinue)
        );
    }

    #[test]
    fn test_classify_with_arguments() {
        assert_eq!(
            classify("source /tmp/foo.c:42:310:beg:0x401136"),
            Annotation::Source(Some("/tmp/foo.c:42:310:beg:0x401136".into()))
        );
        assert_eq!(classify("source"), Annotation::Source(None));
        assert_eq!(classify("field 5"), Annotation::Field(5));
        assert_eq!(classify("exited 3"), Annotation::Exited(Some(3)));
        assert_eq!(
            classify("frame-address"),
            Annotation::Unknown("frame-address".into())
        );
    }

    #[test]
    fn test_parse_source_location() {
        let loc = parse_source_location("foo.c:42:0:beg:0x1000").unwrap();
        assert_eq!(loc.file, "foo.c");
        assert_eq!(loc.line, 42);
        assert_eq!(loc.address.as_deref(), Some("0x1000"));

        let loc = parse_source_location("C:\\src\\main.c:7:99:middle:0xdeadbeef").unwrap();
        assert_eq!(loc.file, "C:\\src\\main.c");
        assert_eq!(loc.line, 7);

        assert_eq!(parse_source_location("not a location"), None);
    }

    #[test]
    fn test_parse_info_source() {
        let text = "Current source file is foo.c\nCompilation directory is /home/me\n\
                    Located in /home/me/foo.c\nContains 12 lines.\n";
        assert_eq!(parse_info_source(text).as_deref(), Some("/home/me/foo.c"));
        assert_eq!(parse_info_source("No current source file.\n"), None);
    }

    #[test]
    fn test_parse_info_sources() {
        let text = "Source files for which symbols have been read in:\n\n\
                    /home/me/foo.c, /usr/include/stdio.h\n\n\
                    Source files for which symbols will be read in on demand:\n\n\
                    /home/me/bar.c, /home/me/foo.c\n";
        assert_eq!(
            parse_info_sources(text),
            vec!["/home/me/foo.c", "/usr/include/stdio.h", "/home/me/bar.c"]
        );
    }

    #[test]
    fn test_parse_info_frame() {
        let text = "Stack level 0, frame at 0x7fffffffe0f0:\n \
                    rip = 0x401136 in main (foo.c:5); saved rip = 0x7ffff7dee083\n";
        let frame = parse_info_frame(text).unwrap();
        assert_eq!(frame.address, "0x401136");
        assert_eq!(frame.function.as_deref(), Some("main"));
        assert_eq!(frame.file.as_deref(), Some("foo.c"));
        assert_eq!(frame.line, Some(5));

        assert_eq!(parse_info_frame("No stack.\n"), None);
    }

    #[test]
    fn test_parse_disassembly() {
        let text = "Dump of assembler code for function main:\n   \
                    0x0000000000401132 <+0>:\tpush   %rbp\n=> \
                    0x0000000000401136 <+4>:\tmov    $0x0,%eax\n\
                    End of assembler dump.\n";
        let dis = parse_disassembly(text, Some("main".into()), false);
        assert_eq!(dis.address_start, Some(0x401132));
        assert_eq!(dis.address_end, Some(0x401136));
        assert_eq!(dis.lines.len(), 2);
        assert!(!dis.error);

        let dis = parse_disassembly("No symbol table is loaded.\n", None, false);
        assert!(dis.error);
    }

    #[test]
    fn test_parse_mode_query() {
        assert!(parse_mode_query("^done,asm_insns=[]\n"));
        assert!(!parse_mode_query(
            "^error,msg=\"-data-disassemble: Mode argument must be 0, 1, 2, or 3.\"\n"
        ));
    }

    #[test]
    fn test_matches_confirmation() {
        let patterns = vec!["(y or n) ".to_string(), "(y or [n]) ".to_string()];
        assert!(matches_confirmation("Start it from the beginning? (y or n) ", &patterns));
        assert!(matches_confirmation("Delete all breakpoints? (y or [n]) ", &patterns));
        assert!(!matches_confirmation("(gdb) ", &patterns));
    }

    #[test]
    fn test_breakpoint_table_rows() {
        let mut table = BreakpointTable::default();
        table.record();
        table.field(0);
        table.push_text(b"Num");
        table.begin_body();
        table.record();
        for (index, text) in [
            (0, "1       "),
            (1, "breakpoint     "),
            (2, "keep "),
            (3, "y   "),
            (4, "0x0000000000401136 "),
            (5, "in main at foo.c:5"),
            (9, "\tbreakpoint already hit 2 times"),
        ] {
            table.field(index);
            table.push_text(text.as_bytes());
        }

        let breakpoints = table.finish();
        assert_eq!(breakpoints.len(), 1);
        let bp = &breakpoints[0];
        assert_eq!(bp.number, "1");
        assert_eq!(bp.breakpoint_type, "breakpoint");
        assert!(bp.enabled);
        assert_eq!(bp.address.as_deref(), Some("0x0000000000401136"));
        assert_eq!(bp.function.as_deref(), Some("main"));
        assert_eq!(bp.file.as_deref(), Some("foo.c"));
        assert_eq!(bp.line, Some(5));
        assert_eq!(bp.times, 2);
    }
}
