//! Edge sources.
//!
//! The hardware boundary delivers falling edges on the two data lines.
//! [`EdgeSource`] is the seam a GPIO driver implements; [`MockEdgeSource`]
//! is a programmable implementation for tests and the simulator.

use doorman_core::constants::DEFAULT_KEYSTROKE_BITS;
use doorman_core::{BitFrame, EdgeEvent, Error, Line, Result};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Capacity of the mock edge channel. Large enough for a few full frames.
const MOCK_CHANNEL_CAPACITY: usize = 256;

/// A stream of edges from both data lines, in arrival order.
pub trait EdgeSource: Send {
    /// Wait for the next edge.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose an edge.
    ///
    /// # Errors
    /// Returns `Error::SourceClosed` once no further edges can arrive.
    fn next_edge(&mut self) -> impl Future<Output = Result<EdgeEvent>> + Send;
}

/// Mock edge source fed through a [`MockEdgeSourceHandle`].
///
/// # Examples
///
/// ```
/// use doorman_core::{BitFrame, Line};
/// use doorman_wiegand::{EdgeSource, MockEdgeSource};
///
/// #[tokio::main]
/// async fn main() -> doorman_core::Result<()> {
///     let (mut source, handle) = MockEdgeSource::new();
///
///     handle.send_frame(BitFrame::new(2, 0b10)).await?;
///
///     assert_eq!(source.next_edge().await?.line, Line::B);
///     assert_eq!(source.next_edge().await?.line, Line::A);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockEdgeSource {
    edge_rx: mpsc::Receiver<EdgeEvent>,
    name: String,
}

impl MockEdgeSource {
    /// Create a new mock source with the default name.
    pub fn new() -> (Self, MockEdgeSourceHandle) {
        Self::with_name("mock edge source")
    }

    /// Create a new mock source with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockEdgeSourceHandle) {
        let (edge_tx, edge_rx) = mpsc::channel(MOCK_CHANNEL_CAPACITY);
        let name = name.into();
        (
            Self {
                edge_rx,
                name: name.clone(),
            },
            MockEdgeSourceHandle { edge_tx, name },
        )
    }

    /// Name used in errors and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl EdgeSource for MockEdgeSource {
    async fn next_edge(&mut self) -> Result<EdgeEvent> {
        self.edge_rx
            .recv()
            .await
            .ok_or_else(|| Error::source_closed(self.name.clone()))
    }
}

/// Handle for feeding edges into a [`MockEdgeSource`].
///
/// Edges are stamped with the current Tokio time when sent, so a whole
/// frame sent at once arrives as a single burst. Advance the clock by more
/// than the bit gap between frames.
#[derive(Debug, Clone)]
pub struct MockEdgeSourceHandle {
    edge_tx: mpsc::Sender<EdgeEvent>,
    name: String,
}

impl MockEdgeSourceHandle {
    /// Send a single edge on `line`.
    ///
    /// # Errors
    /// Returns `Error::SourceClosed` if the source has been dropped.
    pub async fn send_edge(&self, line: Line) -> Result<()> {
        self.edge_tx
            .send(EdgeEvent::new(line, Instant::now()))
            .await
            .map_err(|_| Error::source_closed(self.name.clone()))
    }

    /// Send every bit of a frame, most significant first.
    ///
    /// # Errors
    /// Returns `Error::SourceClosed` if the source has been dropped.
    pub async fn send_frame(&self, frame: BitFrame) -> Result<()> {
        for bit in frame.bits() {
            self.send_edge(Line::for_bit(bit)).await?;
        }
        Ok(())
    }

    /// Send a 4-bit keystroke frame.
    ///
    /// # Errors
    /// Returns `Error::SourceClosed` if the source has been dropped.
    pub async fn send_keystroke(&self, code: u8) -> Result<()> {
        self.send_frame(BitFrame::new(DEFAULT_KEYSTROKE_BITS, u64::from(code)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_sent_msb_first() {
        let (mut source, handle) = MockEdgeSource::new();
        handle.send_frame(BitFrame::new(3, 0b011)).await.unwrap();

        let mut lines = Vec::new();
        for _ in 0..3 {
            lines.push(source.next_edge().await.unwrap().line);
        }
        assert_eq!(lines, vec![Line::A, Line::B, Line::B]);
    }

    #[tokio::test]
    async fn test_closed_source_reports_name() {
        let (mut source, handle) = MockEdgeSource::with_name("gpio 14/15");
        drop(handle);
        let err = source.next_edge().await.unwrap_err();
        assert_eq!(err.to_string(), "Edge source closed: gpio 14/15");
    }

    #[tokio::test]
    async fn test_send_after_drop_fails() {
        let (source, handle) = MockEdgeSource::new();
        drop(source);
        assert!(handle.send_keystroke(1).await.is_err());
    }
}
