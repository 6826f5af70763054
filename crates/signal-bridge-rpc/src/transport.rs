//! Newline-delimited transport codec for JSON-RPC messages.
//!
//! Every message is one compact JSON document terminated by `\n`:
//! ```text
//! {"jsonrpc":"2.0","method":"version","id":1}\n
//! {"jsonrpc":"2.0","id":1,"result":{"version":"0.13.4"}}\n
//! ```
//!
//! Decoding never fails on bad content. A line that is not JSON, or JSON that
//! is not a recognizable envelope, is surfaced as a distinct [`InboundFrame`]
//! so the reader can log and skip it without tearing the connection down.
//! Only I/O failures and oversized lines are fatal.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::protocol::{Message, Notification, Request, Response};

/// Maximum line length (16 MB)
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// One decoded line from the daemon.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Response(Response),
    Notification(Notification),
    /// The line was not valid UTF-8 JSON.
    Unparseable { line: String, reason: String },
    /// The line was JSON but not a JSON-RPC 2.0 response or notification.
    Unrecognized { line: String, reason: String },
}

impl InboundFrame {
    fn from_line(line: &[u8]) -> Self {
        let text = String::from_utf8_lossy(line);

        let value = match serde_json::from_slice::<serde_json::Value>(line) {
            Ok(value) => value,
            Err(e) => {
                return InboundFrame::Unparseable {
                    line: text.into_owned(),
                    reason: e.to_string(),
                };
            }
        };

        match Message::from_value(value) {
            Ok(Message::Response(response)) => InboundFrame::Response(response),
            Ok(Message::Notification(notification)) => InboundFrame::Notification(notification),
            Err(e) => InboundFrame::Unrecognized {
                line: text.into_owned(),
                reason: e.to_string(),
            },
        }
    }
}

/// Codec for newline-delimited JSON-RPC messages
#[derive(Debug, Default)]
pub struct JsonLineCodec {
    // Bytes of the buffer already scanned for a newline.
    next_index: usize,
}

impl JsonLineCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for JsonLineCodec {
    type Item = InboundFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(CodecError::LineTooLong(src.len()));
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let newline = self.next_index + offset;
            self.next_index = 0;

            if newline > MAX_LINE_LENGTH {
                return Err(CodecError::LineTooLong(newline));
            }

            let frame = src.split_to(newline + 1);
            let mut line = &frame[..newline];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Ok(Some(InboundFrame::from_line(line)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if !src.is_empty() {
            debug!("Discarding {} bytes of unterminated line at EOF", src.len());
            src.clear();
            self.next_index = 0;
        }

        Ok(None)
    }
}

impl Encoder<Request> for JsonLineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // serde_json escapes control characters, so compact output never holds a raw newline
        let json = serde_json::to_vec(&item)?;

        if json.len() > MAX_LINE_LENGTH {
            return Err(CodecError::LineTooLong(json.len()));
        }

        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');

        Ok(())
    }
}

/// Errors that can occur during codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Line too long: {0} bytes (max: {MAX_LINE_LENGTH})")]
    LineTooLong(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(codec: &mut JsonLineCodec, buf: &mut BytesMut) -> Vec<InboundFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_encode_is_single_terminated_line() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::new();

        let request = Request::new("send", Some(json!({"message": "line1\nline2"})), 1);
        codec.encode(request, &mut buf).unwrap();

        assert_eq!(buf.last(), Some(&b'\n'));
        assert_eq!(
            buf.iter().filter(|b| **b == b'\n').count(),
            1,
            "embedded newlines must be escaped"
        );
        let parsed: serde_json::Value = serde_json::from_slice(&buf[..buf.len() - 1]).unwrap();
        assert_eq!(parsed["params"]["message"], "line1\nline2");
    }

    #[test]
    fn test_decode_response() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"version\":\"0.x\"}}\n"[..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        let InboundFrame::Response(resp) = frame else {
            panic!("Expected Response, got {frame:?}");
        };
        assert_eq!(resp.id, 1);
        assert_eq!(resp.result, Some(json!({"version": "0.x"})));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(b"{\"jsonrpc\":\"2.0\",");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\"id\":4,\"result\":null}");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(frame, InboundFrame::Response(ref r) if r.id == 4));
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(
            &b"{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":1}\n{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":2}\n{\"jsonrpc\":\"2.0\",\"id\":3"[..],
        );

        let frames = decode_all(&mut codec, &mut buf);
        let ids: Vec<u64> = frames
            .iter()
            .map(|f| match f {
                InboundFrame::Response(r) => r.id,
                other => panic!("Expected Response, got {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(&buf[..], b"{\"jsonrpc\":\"2.0\",\"id\":3");
    }

    #[test]
    fn test_invalid_json_is_unparseable_not_error() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"not valid json\n{\"jsonrpc\":\"2.0\",\"id\":1}\n"[..]);

        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 2);
        assert!(
            matches!(&frames[0], InboundFrame::Unparseable { line, .. } if line == "not valid json")
        );
        assert!(matches!(&frames[1], InboundFrame::Response(r) if r.id == 1));
    }

    #[test]
    fn test_invalid_utf8_is_unparseable() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&[0xff, 0xfe, 0x00, b'\n'][..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(frame, InboundFrame::Unparseable { .. }));
    }

    #[test]
    fn test_wrong_shape_is_unrecognized() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"{\"hello\":\"world\"}\n[1,2,3]\n"[..]);

        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 2);
        assert!(
            frames
                .iter()
                .all(|f| matches!(f, InboundFrame::Unrecognized { .. }))
        );
    }

    #[test]
    fn test_notification_frame() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(
            &b"{\"jsonrpc\":\"2.0\",\"method\":\"receive\",\"params\":{\"account\":\"+1555\"}}\n"[..],
        );

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(frame, InboundFrame::Notification(ref n) if n.method == "receive"));
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"\n\r\n  \n{\"jsonrpc\":\"2.0\",\"id\":8}\r\n"[..]);

        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], InboundFrame::Response(r) if r.id == 8));
    }

    #[test]
    fn test_decode_eof_discards_partial_line() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":1}"[..]);

        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_eof_still_yields_complete_lines() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"2.0\",\"id\":1}\ntrailing"[..]);

        assert!(codec.decode_eof(&mut buf).unwrap().is_some());
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_line_too_long() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::new();
        buf.resize(MAX_LINE_LENGTH + 1, b'a');

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::LineTooLong(_))));
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::LineTooLong(20_000_000);
        let msg = err.to_string();
        assert!(msg.contains("20000000"));
        assert!(msg.contains("too long"));

        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let err = CodecError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("connection reset"));
    }
}
