//! Event-to-frame encoding over a response channel

use super::frame::WireFrame;
use crate::graph::{ProtocolEvent, RunError};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

const ENCODE_FAILURE: &str = "Failed to encode stream event";

/// Which terminal frame closed the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The run signalled completion
    Done,
    /// The event stream ended without a completion signal
    BackstopDone,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Frames handed to the channel, `connected` included
    pub frames_written: usize,
    pub terminal: Terminal,
    /// The receiver went away before the stream finished
    pub disconnected: bool,
}

/// Writes wire frames for one run
///
/// Guarantees `connected` first and exactly one terminal frame last.
/// Consuming the encoder drops the sender, which closes the channel.
pub struct StreamEncoder {
    tx: mpsc::Sender<String>,
    terminal: Option<Terminal>,
    frames_written: usize,
    disconnected: bool,
}

impl StreamEncoder {
    /// Open the stream by writing the `connected` frame
    pub async fn connect(tx: mpsc::Sender<String>) -> Self {
        let mut encoder = Self {
            tx,
            terminal: None,
            frames_written: 0,
            disconnected: false,
        };
        encoder.write(&WireFrame::Connected).await;
        encoder
    }

    pub fn is_closed(&self) -> bool {
        self.terminal.is_some()
    }

    /// End the stream with an error frame, unless it is already closed
    pub async fn fail(mut self, message: &str) -> EncodeSummary {
        self.write(&WireFrame::error(message)).await;
        self.summary()
    }

    /// Encode every event of a run, then close the stream
    pub async fn drain<S>(mut self, events: S) -> EncodeSummary
    where
        S: Stream<Item = Result<ProtocolEvent, RunError>> + Send,
    {
        let mut events = std::pin::pin!(events);
        while let Some(item) = events.next().await {
            let frame = match item {
                Ok(event) => WireFrame::from(event),
                Err(e) => WireFrame::error(e.to_string()),
            };
            if self.is_closed() {
                tracing::debug!(frame = frame.type_name(), "Dropping frame after terminal");
                continue;
            }
            self.write(&frame).await;
        }

        if !self.is_closed() {
            self.write(&WireFrame::Done).await;
            self.terminal = Some(Terminal::BackstopDone);
        }
        self.summary()
    }

    async fn write(&mut self, frame: &WireFrame) {
        if self.is_closed() {
            return;
        }

        let (bytes, terminal) = match frame.encode() {
            Ok(bytes) => (bytes, frame.is_terminal()),
            Err(e) => {
                tracing::error!(frame = frame.type_name(), error = %e, "Frame serialization failed");
                match WireFrame::error(ENCODE_FAILURE).encode() {
                    Ok(bytes) => (bytes, true),
                    Err(_) => return,
                }
            }
        };

        if terminal {
            self.terminal = Some(match frame {
                WireFrame::Done => Terminal::Done,
                _ => Terminal::Error,
            });
        }

        if self.disconnected {
            return;
        }
        if self.tx.send(bytes).await.is_err() {
            tracing::debug!("Stream receiver dropped, discarding remaining frames");
            self.disconnected = true;
            return;
        }
        self.frames_written += 1;
    }

    fn summary(&self) -> EncodeSummary {
        EncodeSummary {
            frames_written: self.frames_written,
            terminal: self.terminal.unwrap_or(Terminal::Error),
            disconnected: self.disconnected,
        }
    }
}
