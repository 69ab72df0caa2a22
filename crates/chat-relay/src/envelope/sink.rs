//! Request-scoped frame channel
//!
//! The relay task owns a [`FrameSink`]; the response body owns the matching
//! [`FrameReceiver`]. Dropping the sink on any exit path ends the body, and
//! dropping the receiver (client gone) makes every later write fail.

use axum::body::Body;
use bytes::Bytes;
use std::convert::Infallible;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::WireFrame;

type FrameResult = Result<Bytes, Infallible>;

/// The receiving side went away or the sink was already closed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("frame channel closed")]
pub struct SinkClosed;

/// Create a bounded frame channel
pub fn frame_channel(capacity: usize) -> (FrameSink, FrameReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        FrameSink {
            sender: Some(sender),
            frames_written: 0,
        },
        FrameReceiver { receiver },
    )
}

/// Writing end of a response stream
#[derive(Debug)]
pub struct FrameSink {
    sender: Option<mpsc::Sender<FrameResult>>,
    frames_written: usize,
}

impl FrameSink {
    /// Send one frame, waiting for buffer space
    pub async fn write(&mut self, frame: &WireFrame) -> Result<(), SinkClosed> {
        let sender = self.sender.as_ref().ok_or(SinkClosed)?;
        sender.send(Ok(frame.to_bytes())).await.map_err(|_| SinkClosed)?;
        self.frames_written += 1;
        Ok(())
    }

    /// End the stream. Idempotent.
    pub fn close(&mut self) {
        self.sender.take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.as_ref().is_none_or(|s| s.is_closed())
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }
}

/// Reading end of a response stream
#[derive(Debug)]
pub struct FrameReceiver {
    receiver: mpsc::Receiver<FrameResult>,
}

impl FrameReceiver {
    /// Next encoded record, or None once the sink is closed and drained
    pub async fn recv(&mut self) -> Option<Bytes> {
        match self.receiver.recv().await {
            Some(Ok(bytes)) => Some(bytes),
            Some(Err(never)) => match never {},
            None => None,
        }
    }

    /// Turn into a streaming HTTP body
    pub fn into_body(self) -> Body {
        Body::from_stream(ReceiverStream::new(self.receiver))
    }
}
