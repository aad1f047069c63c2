//! JSON-Lines decoding
//!
//! [`JsonLinesDecoder`] is a [`Decoder`] for newline-delimited JSON, so a
//! byte stream of any chunking can be wrapped in a `FramedRead` and consumed
//! as a stream of decoded values. Bytes are buffered until a full line is
//! available, which keeps multi-byte UTF-8 sequences split across chunks
//! intact.
//!
//! A line that fails to parse is logged and dropped; the stream continues.

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::error::{Error, Result};

/// Newline-delimited JSON decoder
#[derive(Debug)]
pub struct JsonLinesDecoder<T = serde_json::Value> {
    /// Offset up to which the buffer is known to contain no newline
    next_index: usize,
    max_line_length: Option<usize>,
    /// Dropping the rest of an over-long line
    discarding: bool,
    lines_dropped: usize,
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonLinesDecoder<T> {
    /// Decoder without a line length limit
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_line_length: None,
            discarding: false,
            lines_dropped: 0,
            _item: PhantomData,
        }
    }

    /// Decoder that discards lines longer than `max` bytes
    #[must_use]
    pub fn with_max_line_length(max: usize) -> Self {
        Self {
            max_line_length: Some(max),
            ..Self::new()
        }
    }

    /// Lines dropped so far because they were malformed or too long
    #[must_use]
    pub fn lines_dropped(&self) -> usize {
        self.lines_dropped
    }

    fn over_limit(&self, len: usize) -> Option<Error> {
        match self.max_line_length {
            Some(max) if len > max => Some(Error::LineTooLong { len, max }),
            _ => None,
        }
    }
}

impl<T> Default for JsonLinesDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> JsonLinesDecoder<T> {
    fn parse_line(&mut self, line: &[u8]) -> Option<T> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_slice(line) {
            Ok(item) => Some(item),
            Err(e) => {
                self.lines_dropped += 1;
                warn!(error = %e, len = line.len(), "Dropping malformed JSON line");
                None
            }
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonLinesDecoder<T> {
    type Item = T;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<T>> {
        loop {
            let newline = buf[self.next_index..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                self.next_index = buf.len();
                if let Some(err) = self.over_limit(buf.len()) {
                    if !self.discarding {
                        self.lines_dropped += 1;
                        warn!(error = %err, "Discarding over-long JSON line");
                    }
                    buf.clear();
                    self.next_index = 0;
                    self.discarding = true;
                }
                return Ok(None);
            };

            let end = self.next_index + offset;
            let line = buf.split_to(end + 1);
            self.next_index = 0;

            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if let Some(err) = self.over_limit(end) {
                self.lines_dropped += 1;
                warn!(error = %err, "Discarding over-long JSON line");
                continue;
            }
            if let Some(item) = self.parse_line(&line[..end]) {
                return Ok(Some(item));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<T>> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        if buf.is_empty() {
            return Ok(None);
        }

        let rest = buf.split_to(buf.len());
        self.next_index = 0;
        if std::mem::take(&mut self.discarding) {
            return Ok(None);
        }
        Ok(self.parse_line(&rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use tokio_util::codec::FramedRead;

    const FEED: &[u8] = b"{\"a\":1}\n{\"b\":2}\n";

    /// Feed `chunks` through a fresh decoder the way `FramedRead` would
    fn decode_chunks(chunks: &[&[u8]]) -> Vec<Value> {
        let mut decoder = JsonLinesDecoder::<Value>::new();
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for chunk in chunks {
            buf.extend_from_slice(chunk);
            while let Some(item) = decoder.decode(&mut buf).unwrap() {
                out.push(item);
            }
        }
        while let Some(item) = decoder.decode_eof(&mut buf).unwrap() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_every_split_point_yields_same_objects() {
        let expected = vec![json!({"a": 1}), json!({"b": 2})];
        for split in 0..=FEED.len() {
            let (head, tail) = FEED.split_at(split);
            assert_eq!(decode_chunks(&[head, tail]), expected, "split at {split}");
        }
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let chunks: Vec<&[u8]> = FEED.chunks(1).collect();
        assert_eq!(
            decode_chunks(&chunks),
            vec![json!({"a": 1}), json!({"b": 2})]
        );
    }

    #[test]
    fn test_multibyte_utf8_split_across_chunks() {
        let feed = "{\"name\":\"caf\u{e9} \u{1f680}\"}\n".as_bytes();
        for split in 0..=feed.len() {
            let (head, tail) = feed.split_at(split);
            assert_eq!(
                decode_chunks(&[head, tail]),
                vec![json!({"name": "caf\u{e9} \u{1f680}"})]
            );
        }
    }

    #[test]
    fn test_malformed_line_is_isolated() {
        let mut decoder = JsonLinesDecoder::<Value>::new();
        let mut buf = BytesMut::from(&b"{\"a\":1}\n{oops\n{\"b\":2}\n"[..]);

        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(json!({"a": 1})));
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(json!({"b": 2})));
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(decoder.lines_dropped(), 1);
    }

    #[test]
    fn test_blank_lines_and_crlf_are_skipped() {
        assert_eq!(
            decode_chunks(&[b"\n  \r\n{\"a\":1}\r\n\n"]),
            vec![json!({"a": 1})]
        );
    }

    #[test]
    fn test_trailing_line_without_newline() {
        assert_eq!(
            decode_chunks(&[b"{\"a\":1}\n{\"b\"", b":2}"]),
            vec![json!({"a": 1}), json!({"b": 2})]
        );
    }

    #[test]
    fn test_over_long_line_is_discarded() {
        let mut decoder = JsonLinesDecoder::<Value>::with_max_line_length(16);
        let mut buf = BytesMut::new();
        let mut out = Vec::new();

        let long = format!("{{\"padding\":\"{}\"}}\n", "x".repeat(64));
        for chunk in [long.as_bytes(), b"{\"ok\":true}\n"] {
            for piece in chunk.chunks(5) {
                buf.extend_from_slice(piece);
                while let Some(item) = decoder.decode(&mut buf).unwrap() {
                    out.push(item);
                }
            }
        }

        assert_eq!(out, vec![json!({"ok": true})]);
        assert_eq!(decoder.lines_dropped(), 1);
    }

    #[tokio::test]
    async fn test_framed_read_over_async_reader() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"schema\":\"olm.pack")
            .read(b"age\",\"name\":\"etcd\"}\n{\"schema\":")
            .read(b"\"olm.channel\"}")
            .build();

        let items: Vec<Value> = FramedRead::new(reader, JsonLinesDecoder::new())
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(
            items,
            vec![
                json!({"schema": "olm.package", "name": "etcd"}),
                json!({"schema": "olm.channel"}),
            ]
        );
    }
}
