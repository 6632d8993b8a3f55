//! A hand-rolled STOMP 1.2 frame codec. The broker is reached only as an
//! external collaborator over the wire and no STOMP crate is part of this
//! workspace's dependency stack, so the wire handling here follows the
//! same shape as the hand-written RESP codec in `src/protocol/resp.rs`: an
//! owned value type plus `encode`/`decode` over a growable buffer, where
//! `decode` signals "need more bytes" with a distinguished error rather
//! than panicking on a partial frame.
//!
//! Frame grammar: `COMMAND\nheader:value\n...\n\nbody\0`.

use bytes::{Buf, BytesMut};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("incomplete frame")]
    Incomplete,
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type FrameResult<T> = Result<T, FrameError>;

/// One STOMP frame. Headers keep their insertion order and allow repeats
/// (a command message may carry several `PlastronArg-*` headers), so they
/// are a `Vec` rather than a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StompFrame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// The value of the first header named `key`, if any.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_bytes());
        out.push(b'\n');
        for (k, v) in &self.headers {
            out.extend_from_slice(escape(k).as_bytes());
            out.push(b':');
            out.extend_from_slice(escape(v).as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }

    /// Parse one frame from the front of `buf`, consuming it on success.
    /// Returns `Ok(None)` only when `buf` is entirely empty; a frame that
    /// is merely incomplete is `Err(FrameError::Incomplete)` so the caller
    /// can tell "need more bytes" apart from "no bytes at all".
    pub fn decode(buf: &mut BytesMut) -> FrameResult<Option<StompFrame>> {
        if buf.is_empty() {
            return Ok(None);
        }
        // Leading newlines between frames are valid STOMP keepalive noise.
        while buf.first() == Some(&b'\n') {
            buf.advance(1);
            if buf.is_empty() {
                return Ok(None);
            }
        }

        let header_end = find_subslice(buf, b"\n\n").ok_or(FrameError::Incomplete)?;
        let head = buf[..header_end].to_vec();
        let mut lines = head.split(|&b| b == b'\n');

        let command = String::from_utf8(lines.next().unwrap_or_default().to_vec())
            .map_err(|e| FrameError::InvalidEncoding(e.to_string()))?;
        if command.is_empty() {
            return Err(FrameError::Protocol("empty command line".to_string()));
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let text = String::from_utf8(line.to_vec()).map_err(|e| FrameError::InvalidEncoding(e.to_string()))?;
            let (k, v) = text
                .split_once(':')
                .ok_or_else(|| FrameError::Protocol(format!("malformed header line: {text}")))?;
            headers.push((unescape(k), unescape(v)));
        }

        let body_start = header_end + 2;
        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .and_then(|(_, v)| v.parse::<usize>().ok());

        let (body, frame_len) = if let Some(len) = content_length {
            let needed = body_start + len + 1;
            if buf.len() < needed {
                return Err(FrameError::Incomplete);
            }
            if buf[body_start + len] != 0 {
                return Err(FrameError::Protocol("missing NUL terminator after content-length body".to_string()));
            }
            (buf[body_start..body_start + len].to_vec(), needed)
        } else {
            match buf[body_start..].iter().position(|&b| b == 0) {
                Some(nul_offset) => (
                    buf[body_start..body_start + nul_offset].to_vec(),
                    body_start + nul_offset + 1,
                ),
                None => return Err(FrameError::Incomplete),
            }
        };

        buf.advance(frame_len);
        Ok(Some(StompFrame { command, headers, body }))
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace(':', "\\c").replace('\r', "\\r")
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('c') => out.push(':'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_send_frame() {
        let frame = StompFrame::new("SEND")
            .with_header("destination", "/topic/plastron.jobs.progress")
            .with_header("PlastronJobId", "import:2024")
            .with_body(b"{\"ok\":true}".to_vec());
        let mut buf = BytesMut::from(&frame.encode()[..]);
        let decoded = StompFrame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.command, "SEND");
        assert_eq!(decoded.header("destination"), Some("/topic/plastron.jobs.progress"));
        assert_eq!(decoded.header("PlastronJobId"), Some("import:2024"));
        assert_eq!(decoded.body, b"{\"ok\":true}");
        assert!(buf.is_empty());
    }

    #[test]
    fn escapes_colons_in_header_values() {
        let frame = StompFrame::new("MESSAGE").with_header("PlastronArg-container", "http://ex/x:y");
        let mut buf = BytesMut::from(&frame.encode()[..]);
        let decoded = StompFrame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.header("PlastronArg-container"), Some("http://ex/x:y"));
    }

    #[test]
    fn incomplete_frame_is_distinguished_from_no_data() {
        let mut empty = BytesMut::new();
        assert!(matches!(StompFrame::decode(&mut empty), Ok(None)));

        let mut partial = BytesMut::from(&b"SEND\ndestination:/q"[..]);
        assert!(matches!(StompFrame::decode(&mut partial), Err(FrameError::Incomplete)));
    }

    #[test]
    fn respects_content_length_for_binary_bodies() {
        let body = b"a\x00b".to_vec();
        let frame = StompFrame::new("SEND")
            .with_header("content-length", body.len().to_string())
            .with_body(body.clone());
        let mut buf = BytesMut::from(&frame.encode()[..]);
        let decoded = StompFrame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.body, body);
    }

    #[test]
    fn two_frames_back_to_back_decode_independently() {
        let a = StompFrame::new("MESSAGE").with_header("PlastronJobId", "a").with_body(b"1".to_vec());
        let b = StompFrame::new("MESSAGE").with_header("PlastronJobId", "b").with_body(b"2".to_vec());
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&a.encode());
        buf.extend_from_slice(&b.encode());
        let first = StompFrame::decode(&mut buf).unwrap().unwrap();
        let second = StompFrame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.header("PlastronJobId"), Some("a"));
        assert_eq!(second.header("PlastronJobId"), Some("b"));
        assert!(buf.is_empty());
    }
}
