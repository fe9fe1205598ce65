//! Event stream frame decoding.
//!
//! A frame is two concatenated CBOR items: a header map `{op, t?}` and a
//! body map. `op == 1` is a message whose shape is selected by `t`;
//! `op == -1` is an error frame. The header's byte length is measured by a
//! streaming decode that reports its consumed bytes.

use std::io::Cursor;

use ciborium::Value as CborValue;

use nimbus_common::cbor;
use nimbus_common::{Error, Result};

/// A decoded frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame kind: `1` for messages, `-1` for errors.
    pub op: i64,
    /// Message type discriminator (e.g. `#commit`), present on messages.
    pub t: Option<String>,
}

/// A decoded frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A message frame carrying a typed body.
    Message {
        /// The `t` discriminator, when present.
        t: Option<String>,
        /// The decoded body item.
        body: CborValue,
    },
    /// An error frame from the server.
    Error {
        /// Error code.
        error: String,
        /// Optional human-readable message.
        message: Option<String>,
    },
}

impl Frame {
    /// Decodes a binary frame into its header and body items.
    ///
    /// # Errors
    /// Returns [`Error::FrameDecoding`] on malformed headers, unknown ops,
    /// or a frame with no body bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let header_value: CborValue = ciborium::from_reader(&mut cursor)
            .map_err(|e| Error::FrameDecoding(format!("header: {e}")))?;
        let header = parse_header(&header_value)?;

        let body_start = usize::try_from(cursor.position())
            .map_err(|_| Error::FrameDecoding("header too large".into()))?;
        if body_start >= bytes.len() {
            return Err(Error::FrameDecoding("no body".into()));
        }

        let body: CborValue = ciborium::from_reader(&bytes[body_start..])
            .map_err(|e| Error::FrameDecoding(format!("body: {e}")))?;

        match header.op {
            1 => Ok(Self::Message { t: header.t, body }),
            -1 => {
                let (error, message) = match &body {
                    CborValue::Map(map) => (
                        cbor::map_get(map, "error")
                            .and_then(cbor::as_text)
                            .unwrap_or("Unknown")
                            .to_string(),
                        cbor::map_get(map, "message")
                            .and_then(cbor::as_text)
                            .map(str::to_string),
                    ),
                    _ => ("Unknown".to_string(), None),
                };
                Ok(Self::Error { error, message })
            }
            op => Err(Error::FrameDecoding(format!("unknown op: {op}"))),
        }
    }
}

fn parse_header(value: &CborValue) -> Result<FrameHeader> {
    let CborValue::Map(map) = value else {
        return Err(Error::FrameDecoding("header must be a map".into()));
    };

    let op = cbor::map_get(map, "op")
        .and_then(cbor::as_i64)
        .ok_or_else(|| Error::FrameDecoding("header is missing op".into()))?;
    let t = cbor::map_get(map, "t")
        .and_then(cbor::as_text)
        .map(str::to_string);

    Ok(FrameHeader { op, t })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_item(value: &CborValue) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).unwrap();
        buf
    }

    fn header(op: i64, t: Option<&str>) -> CborValue {
        let mut map = vec![(
            CborValue::Text("op".into()),
            CborValue::Integer(op.into()),
        )];
        if let Some(t) = t {
            map.push((CborValue::Text("t".into()), CborValue::Text(t.into())));
        }
        CborValue::Map(map)
    }

    #[test]
    fn test_decode_message_frame() {
        let mut frame = encode_item(&header(1, Some("#commit")));
        frame.extend(encode_item(&CborValue::Map(vec![(
            CborValue::Text("seq".into()),
            CborValue::Integer(42.into()),
        )])));

        match Frame::decode(&frame).unwrap() {
            Frame::Message { t, body } => {
                assert_eq!(t.as_deref(), Some("#commit"));
                assert!(matches!(body, CborValue::Map(_)));
            }
            other => panic!("expected message frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_frame() {
        let mut frame = encode_item(&header(-1, None));
        frame.extend(encode_item(&CborValue::Map(vec![
            (
                CborValue::Text("error".into()),
                CborValue::Text("FutureCursor".into()),
            ),
            (
                CborValue::Text("message".into()),
                CborValue::Text("cursor is ahead".into()),
            ),
        ])));

        match Frame::decode(&frame).unwrap() {
            Frame::Error { error, message } => {
                assert_eq!(error, "FutureCursor");
                assert_eq!(message.as_deref(), Some("cursor is ahead"));
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_without_body_fails() {
        let frame = encode_item(&header(1, Some("#commit")));

        match Frame::decode(&frame) {
            Err(Error::FrameDecoding(reason)) => assert!(reason.contains("no body")),
            other => panic!("expected frame decoding error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_op_fails() {
        let mut frame = encode_item(&header(7, None));
        frame.extend(encode_item(&CborValue::Map(vec![])));

        assert!(matches!(
            Frame::decode(&frame),
            Err(Error::FrameDecoding(_))
        ));
    }

    #[test]
    fn test_garbage_header_fails() {
        assert!(matches!(
            Frame::decode(&[0xFF, 0xFF]),
            Err(Error::FrameDecoding(_))
        ));
    }
}
