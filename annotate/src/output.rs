/// Output sinks and the update queue seam
///
/// `OutputSink` replaces a raw buffer plus capacity: `parse` checks the
/// remaining room before committing anything. `UpdateQueue` is the FIFO the
/// engine appends structured updates to.

use std::collections::VecDeque;
use tokio::sync::mpsc;

use crate::types::{Stream, Update};
use crate::{EngineError, Result};

/// Growable byte buffer with an optional capacity limit
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    data: Vec<u8>,
    limit: Option<usize>,
}

impl OutputSink {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit: Some(limit),
        }
    }

    /// Bytes that can still be appended
    pub fn remaining(&self) -> usize {
        match self.limit {
            Some(limit) => limit.saturating_sub(self.data.len()),
            None => usize::MAX,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Take everything written so far, freeing the capacity
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub(crate) fn check(&self, needed: usize, stream: Stream) -> Result<()> {
        let available = self.remaining();
        if needed > available {
            return Err(EngineError::BufferTooSmall {
                stream,
                needed,
                available,
            });
        }
        Ok(())
    }

    pub(crate) fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

/// FIFO that receives the engine's updates; the engine only ever appends
pub trait UpdateQueue {
    fn push(&mut self, update: Update);
}

impl UpdateQueue for VecDeque<Update> {
    fn push(&mut self, update: Update) {
        self.push_back(update);
    }
}

impl UpdateQueue for Vec<Update> {
    fn push(&mut self, update: Update) {
        Vec::push(self, update);
    }
}

impl UpdateQueue for mpsc::UnboundedSender<Update> {
    fn push(&mut self, update: Update) {
        if self.send(update).is_err() {
            log::warn!("Update receiver dropped, discarding update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_sink_reports_room() {
        let mut sink = OutputSink::bounded(4);
        assert!(sink.check(4, Stream::Debugger).is_ok());
        sink.append(b"abc");
        assert_eq!(sink.remaining(), 1);

        match sink.check(2, Stream::Inferior) {
            Err(EngineError::BufferTooSmall {
                stream,
                needed,
                available,
            }) => {
                assert_eq!(stream, Stream::Inferior);
                assert_eq!(needed, 2);
                assert_eq!(available, 1);
            }
            other => panic!("Expected BufferTooSmall, got {:?}", other),
        }

        assert_eq!(sink.drain(), b"abc".to_vec());
        assert_eq!(sink.remaining(), 4);
    }

    #[test]
    fn test_channel_queue_forwards_updates() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        UpdateQueue::push(&mut tx, Update::DebuggerQuit);
        assert_eq!(rx.try_recv().unwrap(), Update::DebuggerQuit);
    }
}
