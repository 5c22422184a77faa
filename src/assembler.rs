//! # Utterance Assembler
//!
//! Collects inbound binary frames into one discrete utterance and recognizes
//! the control sentinels that bound it. This is a pure state machine; the
//! session controller owns the socket and the idle timer and feeds frames in.
//!
//! ## Per-utterance state machine:
//! `COLLECTING -> { CLOSED_NORMAL | CLOSED_EMPTY | TIMED_OUT | CLOSE_REQUESTED }`
//!
//! - binary frame: append to the buffer, stay collecting
//! - `__END__`: yield the accumulated bytes ([`FrameOutcome::Utterance`]),
//!   or [`FrameOutcome::Empty`] if nothing was buffered
//! - `__CLOSE__`: discard any partial buffer and request session teardown
//! - idle timeout (driven externally): [`UtteranceAssembler::discard`] resets
//!   the buffer so a fresh utterance can begin

use crate::protocol;

/// What the assembler decided about one inbound frame.
#[derive(Debug, PartialEq)]
pub enum FrameOutcome {
    /// Audio data was appended; keep collecting.
    Collecting,

    /// End marker received with data buffered: one complete utterance.
    Utterance(Vec<u8>),

    /// End marker received with nothing buffered.
    Empty,

    /// Close sentinel received; the session should terminate now.
    CloseRequested,
}

/// Accumulates raw compressed audio bytes for the utterance in progress.
///
/// At most one utterance is ever being assembled per session; a completed
/// utterance is handed off by value and never reused.
#[derive(Debug, Default)]
pub struct UtteranceAssembler {
    buffer: Vec<u8>,
    turn_seq: u64,
}

impl UtteranceAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one inbound binary frame and update the buffer accordingly.
    pub fn accept_frame(&mut self, frame: &[u8]) -> FrameOutcome {
        if protocol::is_close_marker(frame) {
            // Any in-progress recording is abandoned on close
            self.buffer.clear();
            return FrameOutcome::CloseRequested;
        }

        if protocol::is_end_marker(frame) {
            if self.buffer.is_empty() {
                return FrameOutcome::Empty;
            }
            self.turn_seq += 1;
            return FrameOutcome::Utterance(std::mem::take(&mut self.buffer));
        }

        self.buffer.extend_from_slice(frame);
        FrameOutcome::Collecting
    }

    /// Drop the partial buffer (idle timeout) and restart a fresh utterance.
    pub fn discard(&mut self) {
        self.buffer.clear();
    }

    /// Bytes buffered for the utterance in progress.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of utterances completed so far in this session.
    pub fn turn_seq(&self) -> u64 {
        self.turn_seq
    }
}
