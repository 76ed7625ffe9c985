//! Newline-delimited JSON framing over async byte streams

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::IpcError;
use crate::protocol::{MessageEnvelope, FRAME_MARKER, IPC_PROTOCOL_VERSION};

/// One line read from the other end
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    Message(T),
    /// A line without the frame marker, written by something other than the
    /// protocol writer
    Stray(String),
}

/// Writes enveloped messages, one JSON document per line
pub struct FrameWriter<W> {
    writer: W,
    marked: bool,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Writer for the engine to worker direction
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            marked: false,
        }
    }

    /// Writer whose lines start with [`FRAME_MARKER`], for the worker to
    /// engine direction
    pub fn marked(writer: W) -> Self {
        Self {
            writer,
            marked: true,
        }
    }

    pub fn encode<T: Serialize>(&self, message: T) -> Result<String, IpcError> {
        let envelope = MessageEnvelope::new(message);
        let json = serde_json::to_string(&envelope)
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;
        Ok(if self.marked {
            format!("{}{}\n", FRAME_MARKER, json)
        } else {
            format!("{}\n", json)
        })
    }

    pub async fn send<T: Serialize>(&mut self, message: T) -> Result<(), IpcError> {
        let line = self.encode(message)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Flush and shut the stream down so the reader sees end of file
    pub async fn close(&mut self) -> Result<(), IpcError> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Reads lines written by a [`FrameWriter`].
///
/// [`FrameReader::next_frame`] is cancel safe: bytes of a partially read line
/// are kept and completed by the next call.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    marked: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            marked: false,
        }
    }

    /// Reader expecting [`FRAME_MARKER`] on protocol lines; other lines are
    /// returned as [`Frame::Stray`]
    pub fn marked(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            marked: true,
        }
    }

    /// Next non-empty line, or `None` once the stream has ended
    pub async fn next_frame<T: DeserializeOwned>(&mut self) -> Result<Option<Frame<T>>, IpcError> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.pending).await?;
            if read == 0 && self.pending.is_empty() {
                return Ok(None);
            }

            let bytes = std::mem::take(&mut self.pending);
            let text = String::from_utf8_lossy(&bytes);
            let line = text.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            return self.decode(line).map(Some);
        }
    }

    fn decode<T: DeserializeOwned>(&self, line: &str) -> Result<Frame<T>, IpcError> {
        let payload = if self.marked {
            match line.strip_prefix(FRAME_MARKER) {
                Some(payload) => payload,
                None => return Ok(Frame::Stray(line.to_string())),
            }
        } else {
            line
        };

        let envelope: MessageEnvelope<T> = serde_json::from_str(payload)
            .map_err(|e| IpcError::DeserializationError(e.to_string()))?;

        // Check protocol version compatibility
        if !envelope.is_compatible() {
            return Err(IpcError::ProtocolVersionMismatch {
                expected: IPC_PROTOCOL_VERSION,
                actual: envelope.protocol_version,
            });
        }

        Ok(Frame::Message(envelope.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CoordinatorMessage;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_marked_frames_and_stray_lines() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::marked(client);
        let mut reader = FrameReader::marked(server);

        writer.send(CoordinatorMessage::Ack).await.unwrap();
        writer.writer.write_all(b"printed by a task\n").await.unwrap();
        writer
            .send(CoordinatorMessage::TaskResult {
                success: true,
                errors: BTreeMap::new(),
            })
            .await
            .unwrap();
        writer.close().await.unwrap();

        let first: Frame<CoordinatorMessage> = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(first, Frame::Message(CoordinatorMessage::Ack));

        let second: Frame<CoordinatorMessage> = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(second, Frame::Stray("printed by a task".to_string()));

        let third: Frame<CoordinatorMessage> = reader.next_frame().await.unwrap().unwrap();
        assert!(matches!(
            third,
            Frame::Message(CoordinatorMessage::TaskResult { success: true, .. })
        ));

        let end: Option<Frame<CoordinatorMessage>> = reader.next_frame().await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_marked_garbage_is_an_error() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::marked(server);

        client
            .write_all(format!("{}not json\n", FRAME_MARKER).as_bytes())
            .await
            .unwrap();

        let result: Result<Option<Frame<CoordinatorMessage>>, _> = reader.next_frame().await;
        assert!(matches!(result, Err(IpcError::DeserializationError(_))));
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server);

        client
            .write_all(
                b"{\"protocol_version\":99,\"timestamp\":\"2026-01-01T00:00:00Z\",\"message\":{\"type\":\"ack\"}}\n",
            )
            .await
            .unwrap();

        let result: Result<Option<Frame<CoordinatorMessage>>, _> = reader.next_frame().await;
        assert!(matches!(
            result,
            Err(IpcError::ProtocolVersionMismatch { actual: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_read_keeps_partial_line() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server);
        let line = FrameWriter::new(tokio::io::sink())
            .encode(CoordinatorMessage::Ack)
            .unwrap();
        let (head, tail) = line.split_at(10);

        client.write_all(head.as_bytes()).await.unwrap();
        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            reader.next_frame::<CoordinatorMessage>(),
        )
        .await;
        assert!(timed_out.is_err());

        client.write_all(tail.as_bytes()).await.unwrap();
        let frame = reader.next_frame::<CoordinatorMessage>().await.unwrap();
        assert_eq!(frame, Some(Frame::Message(CoordinatorMessage::Ack)));
    }
}
