use std::convert::TryInto;
use std::io::Cursor;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::reply::{ParseError, Reply};
use crate::Error;

/// Incremental RESP decoder. Parsing restarts from the frame start on every
/// call, so partial reads simply leave the bytes in `src` until the frame
/// completes.
pub struct ReplyCodec;

impl Decoder for ReplyCodec {
    type Item = Reply;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut cursor = Cursor::new(&src[..]);
        let reply = match Reply::parse(&mut cursor) {
            Ok(reply) => reply,
            // Not enough data yet; wait for the next read.
            Err(ParseError::Incomplete) => return Ok(None),
            Err(err) => return Err(Error::Protocol(err.to_string())),
        };

        let position: usize = cursor
            .position()
            .try_into()
            .expect("cursor position exceeds usize");

        // Drop the consumed frame from the buffer.
        src.advance(position);

        Ok(Some(reply))
    }
}
