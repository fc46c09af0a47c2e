// https://redis.io/docs/reference/protocol-spec

use std::io::Cursor;

use bytes::{Buf, Bytes};
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

#[derive(Debug, ThisError)]
pub enum ParseError {
    #[error("not enough data is available to parse an entire reply")]
    Incomplete,
    #[error("invalid reply type tag: {0:#04x}")]
    InvalidTypeTag(u8),
    #[error("invalid {0} field")]
    Malformed(&'static str),
    #[error("missing CRLF after bulk payload")]
    MissingTerminator,
}

/// A decoded server reply. `Bulk` and `Array` distinguish the RESP null
/// (`$-1` / `*-1`) from the empty string / empty array.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Parse one complete reply starting at the cursor position. Returns
    /// `ParseError::Incomplete` when the buffer ends mid-frame; the cursor
    /// may then be anywhere, so callers must retry from the frame start
    /// once more bytes have arrived.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, ParseError> {
        match get_byte(src)? {
            b'+' => {
                let line = get_line(src)?;
                Ok(Reply::Simple(String::from_utf8_lossy(line).into_owned()))
            }
            b'-' => {
                let line = get_line(src)?;
                Ok(Reply::Error(String::from_utf8_lossy(line).into_owned()))
            }
            b':' => {
                let line = get_line(src)?;
                let integer = parse_decimal(line).ok_or(ParseError::Malformed("integer"))?;
                Ok(Reply::Integer(integer))
            }
            // $<length>\r\n<data>\r\n
            b'$' => {
                let line = get_line(src)?;
                let length = parse_decimal(line).ok_or(ParseError::Malformed("length"))?;

                if length == -1 {
                    return Ok(Reply::Bulk(None));
                }
                let length = usize::try_from(length).map_err(|_| ParseError::Malformed("length"))?;

                if src.remaining() < length + CRLF.len() {
                    return Err(ParseError::Incomplete);
                }

                let start = src.position() as usize;
                let data = Bytes::copy_from_slice(&src.get_ref()[start..start + length]);
                src.advance(length);

                let mut terminator = [0u8; 2];
                terminator.copy_from_slice(&src.get_ref()[start + length..start + length + 2]);
                src.advance(CRLF.len());
                if &terminator != CRLF {
                    return Err(ParseError::MissingTerminator);
                }

                Ok(Reply::Bulk(Some(data)))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            b'*' => {
                let line = get_line(src)?;
                let count = parse_decimal(line).ok_or(ParseError::Malformed("count"))?;

                if count == -1 {
                    return Ok(Reply::Array(None));
                }
                let count = usize::try_from(count).map_err(|_| ParseError::Malformed("count"))?;

                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::parse(src)?);
                }

                Ok(Reply::Array(Some(items)))
            }
            tag => Err(ParseError::InvalidTypeTag(tag)),
        }
    }

    /// Serialize back to the wire form. Used by test harnesses to script
    /// server responses and to check parser round-trips.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(b'+');
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Reply::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(b'-');
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Reply::Integer(i) => {
                let digits = i.to_string();
                let mut bytes = Vec::with_capacity(1 + digits.len() + CRLF.len());
                bytes.push(b':');
                bytes.extend_from_slice(digits.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Reply::Bulk(None) => b"$-1\r\n".to_vec(),
            Reply::Bulk(Some(data)) => {
                let length = data.len().to_string();
                let mut bytes =
                    Vec::with_capacity(1 + length.len() + CRLF.len() * 2 + data.len());
                bytes.push(b'$');
                bytes.extend_from_slice(length.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Reply::Array(None) => b"*-1\r\n".to_vec(),
            Reply::Array(Some(items)) => {
                let count = items.len().to_string();
                let mut bytes = Vec::with_capacity(1 + count.len() + CRLF.len());
                bytes.push(b'*');
                bytes.extend_from_slice(count.as_bytes());
                bytes.extend_from_slice(CRLF);
                for item in items {
                    bytes.extend(item.encode());
                }
                bytes
            }
        }
    }

    /// Text content of scalar replies: status lines and bulks decode as
    /// UTF-8, integers render base-10. `None` for null bulks and arrays.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Reply::Simple(s) => Some(s.clone()),
            Reply::Bulk(Some(data)) => Some(String::from_utf8_lossy(data).into_owned()),
            Reply::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ParseError> {
    let start = src.position() as usize;
    let end = src.get_ref().len();

    let line_end = src.get_ref()[start..end]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(ParseError::Incomplete)?;

    src.set_position((line_end + CRLF.len()) as u64);

    Ok(&src.get_ref()[start..line_end])
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, ParseError> {
    if !src.has_remaining() {
        return Err(ParseError::Incomplete);
    }
    Ok(src.get_u8())
}

// Strict base-10: an optional leading sign and ASCII digits, nothing else.
fn parse_decimal(line: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(line).ok()?;
    if text.is_empty() {
        return None;
    }
    let digits = text
        .strip_prefix('-')
        .or_else(|| text.strip_prefix('+'))
        .unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<i64>().ok()
}
