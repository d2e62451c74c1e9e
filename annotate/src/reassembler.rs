/// Line reassembly for the annotated output stream
///
/// Raw debugger output arrives in chunks cut at arbitrary byte boundaries.
/// The reassembler keeps the one record that may still be incomplete (a held
/// newline, a partial marker or a partial annotation line) and hands out
/// classified spans as soon as they are unambiguous.

use std::borrow::Cow;

/// Byte that, doubled, introduces an annotation. The debugger puts markers
/// at the start of a line; one in mid-line is accepted as well.
pub const MARKER: u8 = 0x1a;

/// A classified piece of the input
#[derive(Debug, PartialEq, Eq)]
pub enum Span<'a> {
    /// Plain text, to be routed by the state machine
    Text(&'a [u8]),
    /// A complete annotation line; `framing` counts every byte it consumed
    /// (preceding newline, marker, name and terminating newline)
    Annotation { line: Cow<'a, str>, framing: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// At the beginning of a line, nothing held
    LineStart,
    /// In the middle of a line of text
    Text,
    /// A newline is held back: it is framing if a marker follows
    HeldNewline,
    /// One marker byte seen at the start of a line
    Marker,
    /// Inside an annotation line, waiting for its newline
    Name,
}

#[derive(Debug, Clone)]
pub struct Reassembler {
    scan: Scan,
    carry: Vec<u8>,
    max_annotation_len: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl Reassembler {
    pub fn new(max_annotation_len: usize) -> Self {
        Self {
            scan: Scan::LineStart,
            carry: Vec::new(),
            max_annotation_len,
        }
    }

    /// Bytes held back, not yet classified
    pub fn buffered(&self) -> usize {
        self.carry.len()
    }

    /// Classify `input`, calling `emit` for every span in stream order
    pub fn feed<F>(&mut self, input: &[u8], emit: &mut F)
    where
        F: FnMut(Span<'_>),
    {
        let mut i = 0;

        while i < input.len() {
            match self.scan {
                Scan::Text => {
                    let rest = &input[i..];
                    match rest.iter().position(|&b| b == b'\n' || b == MARKER) {
                        Some(pos) => {
                            if pos > 0 {
                                emit(Span::Text(&rest[..pos]));
                            }
                            self.carry.push(rest[pos]);
                            self.scan = if rest[pos] == MARKER {
                                Scan::Marker
                            } else {
                                Scan::HeldNewline
                            };
                            i += pos + 1;
                        }
                        None => {
                            emit(Span::Text(rest));
                            i = input.len();
                        }
                    }
                }
                Scan::LineStart | Scan::HeldNewline => {
                    if input[i] == MARKER {
                        self.carry.push(MARKER);
                        self.scan = Scan::Marker;
                        i += 1;
                    } else {
                        // Reprocess this byte as text.
                        self.flush_carry(emit);
                        self.scan = Scan::Text;
                    }
                }
                Scan::Marker => {
                    if input[i] == MARKER {
                        self.carry.push(MARKER);
                        self.scan = Scan::Name;
                        i += 1;
                    } else {
                        // A lone marker byte is ordinary text.
                        self.flush_carry(emit);
                        self.scan = Scan::Text;
                    }
                }
                Scan::Name => {
                    let rest = &input[i..];
                    match rest.iter().position(|&b| b == b'\n') {
                        Some(pos) => {
                            self.carry.extend_from_slice(&rest[..pos]);
                            i += pos + 1;
                            if self.name_len() > self.max_annotation_len {
                                log::warn!(
                                    "Annotation line exceeds {} bytes, treating it as text",
                                    self.max_annotation_len
                                );
                                self.flush_carry(emit);
                                self.carry.push(b'\n');
                                self.scan = Scan::HeldNewline;
                            } else {
                                self.complete_annotation(emit);
                            }
                        }
                        None => {
                            self.carry.extend_from_slice(rest);
                            i = input.len();
                            if self.name_len() > self.max_annotation_len {
                                log::warn!(
                                    "Annotation line exceeds {} bytes, treating it as text",
                                    self.max_annotation_len
                                );
                                self.flush_carry(emit);
                                self.scan = Scan::Text;
                            }
                        }
                    }
                }
            }
        }
    }

    /// The stream was closed: whatever is held is plain text
    pub fn finish<F>(&mut self, emit: &mut F)
    where
        F: FnMut(Span<'_>),
    {
        let at_line_start = self.scan == Scan::HeldNewline;
        self.flush_carry(emit);
        self.scan = if at_line_start || self.scan == Scan::LineStart {
            Scan::LineStart
        } else {
            Scan::Text
        };
    }

    fn name_len(&self) -> usize {
        let marker_at = self
            .carry
            .iter()
            .position(|&b| b == MARKER)
            .unwrap_or(self.carry.len());
        self.carry.len().saturating_sub(marker_at + 2)
    }

    fn complete_annotation<F>(&mut self, emit: &mut F)
    where
        F: FnMut(Span<'_>),
    {
        let framing = self.carry.len() + 1;
        let marker_at = self
            .carry
            .iter()
            .position(|&b| b == MARKER)
            .unwrap_or(0);
        let name = &self.carry[marker_at + 2..];
        let line = String::from_utf8_lossy(name);
        emit(Span::Annotation { line, framing });
        self.carry.clear();
        self.scan = Scan::LineStart;
    }

    fn flush_carry<F>(&mut self, emit: &mut F)
    where
        F: FnMut(Span<'_>),
    {
        if !self.carry.is_empty() {
            emit(Span::Text(&self.carry));
            self.carry.clear();
        }
    }
}
