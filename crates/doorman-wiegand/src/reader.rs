//! Async frame reader.
//!
//! Drives a [`WiegandDecoder`] from an [`EdgeSource`], sleeping until the
//! decoder's next watchdog deadline. The sleep is rebuilt on every loop
//! iteration, so a deadline replaced by a newer edge can never fire late.
//!
//! Queued edges always win over the watchdog. Frame boundaries are decided
//! by edge timestamps, not by when the reader got around to polling.

use crate::decoder::WiegandDecoder;
use crate::source::EdgeSource;
use doorman_core::{BitFrame, Error, Result};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Reads complete frames from an edge source.
///
/// # Examples
///
/// ```
/// use doorman_core::BitFrame;
/// use doorman_wiegand::{FrameReader, MockEdgeSource};
/// use std::time::Duration;
///
/// #[tokio::main(flavor = "current_thread", start_paused = true)]
/// async fn main() -> doorman_core::Result<()> {
///     let (source, handle) = MockEdgeSource::new();
///     let mut reader = FrameReader::new(source, Duration::from_millis(5));
///
///     handle.send_frame(BitFrame::new(4, 0b0111)).await?;
///     assert_eq!(reader.next_frame().await?, BitFrame::new(4, 0b0111));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FrameReader<S> {
    source: S,
    decoder: WiegandDecoder,
    /// Name of the source once it has reported closing.
    closed: Option<String>,
}

impl<S: EdgeSource> FrameReader<S> {
    /// Create a reader that ends frames after `gap` of silence.
    pub fn new(source: S, gap: Duration) -> Self {
        Self {
            source,
            decoder: WiegandDecoder::new(gap),
            closed: None,
        }
    }

    /// Wait for the next complete frame.
    ///
    /// A frame still in progress when the source closes is completed once
    /// its gap elapses.
    ///
    /// # Errors
    /// Returns the source's error once it has closed and no partial frame
    /// remains.
    pub async fn next_frame(&mut self) -> Result<BitFrame> {
        self.next_timed_frame().await.map(|(frame, _)| frame)
    }

    /// Wait for the next complete frame, along with the time of its last
    /// edge.
    ///
    /// # Errors
    /// Same as [`next_frame`](Self::next_frame).
    pub async fn next_timed_frame(&mut self) -> Result<(BitFrame, Instant)> {
        loop {
            let deadline = self.decoder.next_deadline();

            if let Some(name) = &self.closed {
                let Some(deadline) = deadline else {
                    return Err(Error::source_closed(name.clone()));
                };
                sleep_until(deadline).await;
                if let Some(frame) = self.decoder.on_watchdog(Instant::now()) {
                    return Ok(self.stamped(frame));
                }
                continue;
            }

            tokio::select! {
                biased;

                edge = self.source.next_edge() => match edge {
                    Ok(edge) => {
                        if let Some(frame) = self.decoder.on_edge(edge) {
                            return Ok(self.stamped(frame));
                        }
                    }
                    Err(Error::SourceClosed { source_name }) => {
                        debug!(source = %source_name, pending_bits = self.decoder.pending_bits(), "edge source closed");
                        let in_progress = self.decoder.in_progress();
                        self.closed = Some(source_name.clone());
                        if !in_progress {
                            return Err(Error::source_closed(source_name));
                        }
                    }
                    Err(e) => return Err(e),
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(frame) = self.decoder.on_watchdog(Instant::now()) {
                        return Ok(self.stamped(frame));
                    }
                }
            }
        }
    }

    fn stamped(&self, frame: BitFrame) -> (BitFrame, Instant) {
        let at = self.decoder.completed_at().unwrap_or_else(Instant::now);
        (frame, at)
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.decoder.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockEdgeSource;
    use doorman_core::Line;

    const GAP: Duration = Duration::from_millis(5);

    #[tokio::test(start_paused = true)]
    async fn test_frames_split_by_gap() {
        let (source, handle) = MockEdgeSource::new();
        let mut reader = FrameReader::new(source, GAP);

        handle.send_frame(BitFrame::new(4, 0b0001)).await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap(), BitFrame::new(4, 1));

        handle.send_frame(BitFrame::new(4, 0b1011)).await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap(), BitFrame::new(4, 0b1011));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_without_gap_merge() {
        let (source, handle) = MockEdgeSource::new();
        let mut reader = FrameReader::new(source, GAP);

        handle.send_frame(BitFrame::new(2, 0b10)).await.unwrap();
        handle.send_frame(BitFrame::new(2, 0b01)).await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap(), BitFrame::new(4, 0b1001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edge_within_gap_extends_frame() {
        let (source, handle) = MockEdgeSource::new();
        let mut reader = FrameReader::new(source, GAP);

        let feeder = tokio::spawn(async move {
            handle.send_edge(Line::B).await.unwrap();
            tokio::time::sleep(Duration::from_millis(4)).await;
            handle.send_edge(Line::B).await.unwrap();
            tokio::time::sleep(Duration::from_millis(4)).await;
            handle.send_edge(Line::A).await.unwrap();
            handle
        });

        assert_eq!(reader.next_frame().await.unwrap(), BitFrame::new(3, 0b110));
        drop(feeder.await.unwrap());
        assert!(reader.next_frame().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_frame_flushed_after_close() {
        let (source, handle) = MockEdgeSource::new();
        let mut reader = FrameReader::new(source, GAP);

        handle.send_frame(BitFrame::new(3, 0b101)).await.unwrap();
        drop(handle);

        assert_eq!(reader.next_frame().await.unwrap(), BitFrame::new(3, 0b101));
        assert!(matches!(
            reader.next_frame().await,
            Err(Error::SourceClosed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_edges_are_read_before_watchdog() {
        let (source, handle) = MockEdgeSource::new();
        let mut reader = FrameReader::new(source, GAP);

        // The reader falls behind: both edges sit in the queue while the
        // clock has already moved past the gap.
        for _ in 0..64 {
            handle.send_edge(Line::B).await.unwrap();
            tokio::time::advance(Duration::from_millis(1)).await;
            handle.send_edge(Line::A).await.unwrap();
            tokio::time::advance(Duration::from_millis(20)).await;
            assert_eq!(reader.next_frame().await.unwrap(), BitFrame::new(2, 0b10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_carries_last_edge_time() {
        let (source, handle) = MockEdgeSource::new();
        let mut reader = FrameReader::new(source, GAP);

        handle.send_edge(Line::B).await.unwrap();
        tokio::time::advance(Duration::from_millis(2)).await;
        handle.send_edge(Line::B).await.unwrap();
        let last = Instant::now();
        tokio::time::advance(Duration::from_millis(50)).await;

        let (frame, at) = reader.next_timed_frame().await.unwrap();
        assert_eq!(frame, BitFrame::new(2, 0b11));
        assert_eq!(at, last);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_error_keeps_source_name() {
        let (source, handle) = MockEdgeSource::with_name("gpio 14/15");
        let mut reader = FrameReader::new(source, GAP);
        drop(handle);

        for _ in 0..2 {
            match reader.next_frame().await {
                Err(Error::SourceClosed { source_name }) => assert_eq!(source_name, "gpio 14/15"),
                other => panic!("expected SourceClosed, got {other:?}"),
            }
        }
    }
}
