//! Bit-level Wiegand decoder.
//!
//! A reader signals a `0` bit with a pulse on line A and a `1` bit with a
//! pulse on line B. A frame ends when both lines have been quiet for the
//! configured gap. The decoder keeps one watchdog deadline per line and
//! only completes the frame once both have fired.
//!
//! The decoder is a plain state machine: callers feed edges and poll the
//! watchdogs with the current time. [`FrameReader`](crate::FrameReader)
//! drives it from an [`EdgeSource`](crate::EdgeSource) with Tokio timers.
//!
//! # Examples
//!
//! ```
//! use doorman_core::{BitFrame, EdgeEvent, Line};
//! use doorman_wiegand::WiegandDecoder;
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let mut decoder = WiegandDecoder::new(Duration::from_millis(5));
//! let start = Instant::now();
//!
//! for (i, line) in [Line::B, Line::A, Line::B, Line::B].into_iter().enumerate() {
//!     let at = start + Duration::from_millis(i as u64);
//!     assert!(decoder.on_edge(EdgeEvent::new(line, at)).is_none());
//! }
//!
//! let deadline = decoder.next_deadline().unwrap();
//! assert_eq!(decoder.on_watchdog(deadline), Some(BitFrame::new(4, 0b1011)));
//! ```

use doorman_core::{BitFrame, EdgeEvent, Line};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Frame being accumulated.
#[derive(Debug, Clone)]
struct PartialFrame {
    bit_count: u32,
    value: u64,
    /// Per-line watchdog deadline, indexed by [`Line::index`].
    deadlines: [Instant; 2],
    /// Per-line "watchdog fired" flags.
    timed_out: [bool; 2],
    last_edge: Instant,
}

impl PartialFrame {
    fn both_timed_out(&self) -> bool {
        self.timed_out.iter().all(|&fired| fired)
    }
}

/// Reconstructs [`BitFrame`]s from edges on the two data lines.
#[derive(Debug, Clone)]
pub struct WiegandDecoder {
    gap: Duration,
    frame: Option<PartialFrame>,
    completed_at: Option<Instant>,
}

impl WiegandDecoder {
    /// Create a decoder that ends frames after `gap` of silence on both lines.
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            frame: None,
            completed_at: None,
        }
    }

    /// Returns `true` while at least one bit has been accumulated.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.frame.is_some()
    }

    /// Bits accumulated so far in the current frame.
    #[must_use]
    pub fn pending_bits(&self) -> u32 {
        self.frame.as_ref().map_or(0, |f| f.bit_count)
    }

    /// Record an edge.
    ///
    /// If the edge arrives after both watchdogs of the previous frame would
    /// already have fired, that frame is completed first and returned; the
    /// edge then starts a new frame.
    pub fn on_edge(&mut self, edge: EdgeEvent) -> Option<BitFrame> {
        let completed = self.on_watchdog(edge.at);
        let rearmed = edge.at + self.gap;

        match self.frame.as_mut() {
            None => {
                trace!(line = %edge.line, "frame started");
                self.frame = Some(PartialFrame {
                    bit_count: 1,
                    value: edge.line.bit(),
                    deadlines: [rearmed; 2],
                    timed_out: [false; 2],
                    last_edge: edge.at,
                });
            }
            Some(frame) => {
                frame.bit_count = frame.bit_count.saturating_add(1);
                frame.value = (frame.value << 1) | edge.line.bit();
                frame.deadlines = [rearmed; 2];
                frame.timed_out = [false; 2];
                frame.last_edge = edge.at;
            }
        }

        completed
    }

    /// Earliest watchdog that has not fired yet, if a frame is in progress.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let frame = self.frame.as_ref()?;
        Line::ALL
            .iter()
            .filter(|line| !frame.timed_out[line.index()])
            .map(|line| frame.deadlines[line.index()])
            .min()
    }

    /// Fire every watchdog whose deadline is at or before `now`.
    ///
    /// Returns the completed frame once both lines have timed out. Nothing is
    /// emitted when no bits have been accumulated.
    pub fn on_watchdog(&mut self, now: Instant) -> Option<BitFrame> {
        let frame = self.frame.as_mut()?;

        for line in Line::ALL {
            let i = line.index();
            if !frame.timed_out[i] && frame.deadlines[i] <= now {
                trace!(line = %line, "line quiet");
                frame.timed_out[i] = true;
            }
        }

        if !frame.both_timed_out() {
            return None;
        }

        let frame = self.frame.take()?;
        self.completed_at = Some(frame.last_edge);
        let decoded = BitFrame::new(frame.bit_count, frame.value);
        debug!(bits = decoded.bit_count, value = decoded.value, "frame decoded");
        Some(decoded)
    }

    /// Time of the last edge of the most recently completed frame.
    #[must_use]
    pub fn completed_at(&self) -> Option<Instant> {
        self.completed_at
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAP: Duration = Duration::from_millis(5);

    fn feed(decoder: &mut WiegandDecoder, start: Instant, lines: &[Line]) -> Instant {
        let mut at = start;
        for &line in lines {
            assert!(decoder.on_edge(EdgeEvent::new(line, at)).is_none());
            at += Duration::from_millis(1);
        }
        at - Duration::from_millis(1)
    }

    #[test]
    fn test_first_edge_sets_first_bit() {
        let start = Instant::now();

        let mut decoder = WiegandDecoder::new(GAP);
        decoder.on_edge(EdgeEvent::new(Line::A, start));
        assert_eq!(decoder.on_watchdog(start + GAP), Some(BitFrame::new(1, 0)));

        decoder.on_edge(EdgeEvent::new(Line::B, start));
        assert_eq!(decoder.on_watchdog(start + GAP), Some(BitFrame::new(1, 1)));
    }

    #[test]
    fn test_frame_needs_full_gap() {
        let mut decoder = WiegandDecoder::new(GAP);
        let start = Instant::now();
        let last = feed(&mut decoder, start, &[Line::B, Line::B, Line::A]);

        assert!(decoder.on_watchdog(last + GAP - Duration::from_micros(1)).is_none());
        assert!(decoder.in_progress());
        assert_eq!(decoder.pending_bits(), 3);

        assert_eq!(decoder.on_watchdog(last + GAP), Some(BitFrame::new(3, 0b110)));
        assert!(!decoder.in_progress());
    }

    #[test]
    fn test_edge_rearms_watchdogs() {
        let mut decoder = WiegandDecoder::new(GAP);
        let start = Instant::now();

        decoder.on_edge(EdgeEvent::new(Line::A, start));
        let late = start + Duration::from_millis(4);
        decoder.on_edge(EdgeEvent::new(Line::B, late));

        // The first edge's deadline has passed, but the second re-armed both lines.
        assert!(decoder.on_watchdog(start + GAP).is_none());
        assert_eq!(decoder.next_deadline(), Some(late + GAP));
        assert_eq!(decoder.on_watchdog(late + GAP), Some(BitFrame::new(2, 0b01)));
    }

    #[test]
    fn test_one_line_timeout_does_not_end_frame() {
        let mut decoder = WiegandDecoder::new(GAP);
        let start = Instant::now();
        decoder.on_edge(EdgeEvent::new(Line::A, start));

        // Only line A's watchdog fires.
        if let Some(frame) = decoder.frame.as_mut() {
            frame.deadlines[Line::B.index()] = start + GAP * 2;
        }
        assert!(decoder.on_watchdog(start + GAP).is_none());
        assert_eq!(decoder.next_deadline(), Some(start + GAP * 2));

        // An edge between the two watchdogs continues the frame.
        decoder.on_edge(EdgeEvent::new(Line::B, start + GAP + Duration::from_millis(1)));
        assert_eq!(decoder.pending_bits(), 2);
        let frame = decoder.on_watchdog(start + GAP * 3);
        assert_eq!(frame, Some(BitFrame::new(2, 0b01)));
    }

    #[test]
    fn test_watchdog_without_bits_emits_nothing() {
        let mut decoder = WiegandDecoder::new(GAP);
        assert!(decoder.on_watchdog(Instant::now() + GAP).is_none());
        assert!(decoder.next_deadline().is_none());
    }

    #[test]
    fn test_late_edge_completes_previous_frame() {
        let mut decoder = WiegandDecoder::new(GAP);
        let start = Instant::now();
        let last = feed(&mut decoder, start, &[Line::B, Line::A]);

        let next = decoder.on_edge(EdgeEvent::new(Line::B, last + GAP * 2));
        assert_eq!(next, Some(BitFrame::new(2, 0b10)));
        assert_eq!(decoder.pending_bits(), 1);
        // Stamped with its own last edge, not the edge that flushed it.
        assert_eq!(decoder.completed_at(), Some(last));
    }

    #[test]
    fn test_long_frame_does_not_panic() {
        let mut decoder = WiegandDecoder::new(GAP);
        let start = Instant::now();
        let lines = vec![Line::B; 80];
        let last = feed(&mut decoder, start, &lines);

        let frame = decoder.on_watchdog(last + GAP).unwrap();
        assert_eq!(frame.bit_count, 80);
        assert_eq!(frame.value, u64::MAX);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut decoder = WiegandDecoder::new(GAP);
        let start = Instant::now();
        feed(&mut decoder, start, &[Line::B, Line::B]);
        decoder.reset();
        assert!(decoder.on_watchdog(start + GAP * 10).is_none());
    }
}
