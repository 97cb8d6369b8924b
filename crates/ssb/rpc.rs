//! The length-prefixed request/response multiplexer running inside a
//! boxstream: every RPC frame carries a signed request number (positive for
//! a call, negated for its response), letting many concurrent calls share
//! one encrypted duplex stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use bytes::Bytes;
use p2pkit_core::completion::{completion_pair, Completion, Completor};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::boxstream::{BoxStreamFrame, BoxStreamReader, BoxStreamWriter};
use crate::error::SSBError;

const HEADER_LEN: usize = 9;

pub const FLAG_STREAM: u8 = 0x08;
pub const FLAG_END_OR_ERROR: u8 = 0x04;
const FLAG_BODY_TYPE_MASK: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Binary,
    Utf8,
    Json,
}

impl BodyType {
    fn bits(self) -> u8 {
        match self {
            BodyType::Binary => 0,
            BodyType::Utf8 => 1,
            BodyType::Json => 2,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & FLAG_BODY_TYPE_MASK {
            1 => BodyType::Utf8,
            2 => BodyType::Json,
            _ => BodyType::Binary,
        }
    }
}

/// Which kind of call a frame belongs to, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Async,
    Stream,
}

#[derive(Debug, Clone)]
pub struct RpcFrame {
    pub flags: u8,
    pub request_number: i32,
    pub body: Bytes,
}

impl RpcFrame {
    pub fn new(request_number: i32, body: Bytes, body_type: BodyType, kind: CallKind, end_or_error: bool) -> Self {
        let mut flags = body_type.bits();
        if matches!(kind, CallKind::Stream) {
            flags |= FLAG_STREAM;
        }
        if end_or_error {
            flags |= FLAG_END_OR_ERROR;
        }
        Self {
            flags,
            request_number,
            body,
        }
    }

    pub fn body_type(&self) -> BodyType {
        BodyType::from_bits(self.flags)
    }

    pub fn is_stream(&self) -> bool {
        self.flags & FLAG_STREAM != 0
    }

    pub fn is_end_or_error(&self) -> bool {
        self.flags & FLAG_END_OR_ERROR != 0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len());
        out.push(self.flags);
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.request_number.to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SSBError> {
        if bytes.len() < HEADER_LEN {
            return Err(SSBError::MalformedFrame("frame shorter than header".to_string()));
        }
        let flags = bytes[0];
        let body_length = u32::from_be_bytes(bytes[1..5].try_into().expect("4 bytes")) as usize;
        let request_number = i32::from_be_bytes(bytes[5..9].try_into().expect("4 bytes"));
        let body = bytes
            .get(HEADER_LEN..HEADER_LEN + body_length)
            .ok_or_else(|| SSBError::MalformedFrame("declared body length exceeds frame".to_string()))?;
        Ok(Self {
            flags,
            request_number,
            body: Bytes::copy_from_slice(body),
        })
    }
}

/// Routes inbound RPC frames to the async completion or stream sender
/// registered for the matching outbound request, and serializes outbound
/// sends over a single boxstream writer.
pub struct RpcMultiplexer<R, W> {
    reader: BoxStreamReader<R>,
    writer: BoxStreamWriter<W>,
    next_request_number: AtomicI32,
    pending_async: Mutex<HashMap<i32, Completor<RpcFrame>>>,
    pending_streams: Mutex<HashMap<i32, mpsc::UnboundedSender<RpcFrame>>>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> RpcMultiplexer<R, W> {
    pub fn new(reader: BoxStreamReader<R>, writer: BoxStreamWriter<W>) -> Self {
        Self {
            reader,
            writer,
            next_request_number: AtomicI32::new(1),
            pending_async: Mutex::new(HashMap::new()),
            pending_streams: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_request_number(&self) -> i32 {
        self.next_request_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Sends a single-response call and returns a handle that resolves when
    /// the matching response frame arrives.
    pub async fn call_async(&mut self, body: Bytes, body_type: BodyType) -> Result<Completion<RpcFrame>, SSBError> {
        let request_number = self.allocate_request_number();
        let frame = RpcFrame::new(request_number, body, body_type, CallKind::Async, false);
        self.writer.write(&frame.encode()).await?;

        let (completor, completion) = completion_pair();
        self.pending_async.lock().insert(request_number, completor);
        Ok(completion)
    }

    /// Sends a source-style call and returns a channel that yields every
    /// streamed response frame until the server sends `end/err`.
    pub async fn call_source(
        &mut self,
        body: Bytes,
        body_type: BodyType,
    ) -> Result<mpsc::UnboundedReceiver<RpcFrame>, SSBError> {
        let request_number = self.allocate_request_number();
        let frame = RpcFrame::new(request_number, body, body_type, CallKind::Stream, false);
        self.writer.write(&frame.encode()).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.pending_streams.lock().insert(request_number, tx);
        Ok(rx)
    }

    /// Reads and routes exactly one inbound boxstream frame. Returns `Ok(false)`
    /// once a goodbye frame has closed the connection.
    pub async fn drive_once(&mut self) -> Result<bool, SSBError> {
        match self.reader.read_frame().await? {
            BoxStreamFrame::Goodbye => {
                for (_, completor) in self.pending_async.lock().drain() {
                    drop(completor); // dropping the Completor cancels the waiter
                }
                self.pending_streams.lock().clear();
                Ok(false)
            }
            BoxStreamFrame::Data(bytes) => {
                let frame = RpcFrame::decode(&bytes)?;
                self.route(frame);
                Ok(true)
            }
        }
    }

    fn route(&self, frame: RpcFrame) {
        let owning_request = frame.request_number.unsigned_abs() as i32;
        if frame.request_number >= 0 {
            // Inbound call from the peer with no local routing entry yet;
            // callers observe these through a higher-level request handler,
            // which is out of scope for the multiplexer itself.
            return;
        }
        if frame.is_stream() {
            let mut streams = self.pending_streams.lock();
            if let Some(tx) = streams.get(&owning_request) {
                let done = frame.is_end_or_error();
                let _ = tx.send(frame);
                if done {
                    streams.remove(&owning_request);
                }
            }
            return;
        }
        if let Some(completor) = self.pending_async.lock().remove(&owning_request) {
            let _ = completor.complete(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_encode_decode() {
        let frame = RpcFrame::new(7, Bytes::from_static(b"hello"), BodyType::Utf8, CallKind::Async, false);
        let encoded = frame.encode();
        let decoded = RpcFrame::decode(&encoded).unwrap();
        assert_eq!(decoded.request_number, 7);
        assert_eq!(decoded.body, Bytes::from_static(b"hello"));
        assert_eq!(decoded.body_type(), BodyType::Utf8);
        assert!(!decoded.is_stream());
    }

    #[test]
    fn negated_request_number_marks_a_response() {
        let frame = RpcFrame::new(-3, Bytes::new(), BodyType::Json, CallKind::Stream, true);
        assert_eq!(frame.request_number, -3);
        assert!(frame.is_stream());
        assert!(frame.is_end_or_error());
    }

    #[test]
    fn decode_rejects_truncated_frame() {
        assert!(RpcFrame::decode(&[0u8; 4]).is_err());
    }
}
