use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use self::{request::EncodedRequest, response::Response};
use crate::errors::{CodecDecodeError, CodecEncodeError, DecodingError};

pub mod consts;
pub mod request;
pub mod response;
pub mod utils;

/// Byte size of the frame length prefix: `0xCE` marker plus big-endian `u32`.
const LENGTH_PREFIX_SIZE: usize = 5;

/// Client side of the IPROTO framing.
///
/// Every frame is `0xCE ∥ BE32(length) ∥ header map ∥ body map`. The
/// encoder always emits the 5-byte length form so a frame can be
/// written before its size is known; the decoder accepts exactly
/// that form.
#[derive(Default)]
pub(crate) struct ClientCodec {
    next_frame_length: Option<usize>,
}

impl Decoder for ClientCodec {
    type Item = Response;

    type Error = CodecDecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let next_frame_length = match self.next_frame_length {
            Some(x) => x,
            None => {
                if src.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }
                let marker = src.get_u8();
                if marker != 0xce {
                    return Err(DecodingError::bad_length_marker(marker).into());
                }
                let length = src.get_u32() as usize;
                if length == 0 {
                    return Err(DecodingError::message_pack(anyhow::anyhow!(
                        "frame length is zero"
                    ))
                    .into());
                }
                self.next_frame_length = Some(length);
                length
            }
        };
        if src.len() >= next_frame_length {
            self.next_frame_length = None;
            let frame_bytes = src.split_to(next_frame_length);
            Response::decode(frame_bytes)
                .map(Some)
                .map_err(CodecDecodeError::Decode)
        } else {
            src.reserve(next_frame_length - src.len());
            Ok(None)
        }
    }
}

impl Encoder<EncodedRequest> for ClientCodec {
    type Error = CodecEncodeError;

    // Write the frame with a zero length, then patch the prefix once
    // the actual size of the encoded message is known.
    fn encode(&mut self, item: EncodedRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let begin_idx = dst.len();
        dst.put_slice(&[0xce, 0, 0, 0, 0]);

        item.encode(dst.writer()).map_err(CodecEncodeError::Encode)?;

        let frame_length = (dst.len() - begin_idx - LENGTH_PREFIX_SIZE) as u32;
        dst[begin_idx + 1..begin_idx + LENGTH_PREFIX_SIZE]
            .copy_from_slice(&frame_length.to_be_bytes());
        Ok(())
    }
}

/// Greeting message from server.
///
/// [Docs](https://www.tarantool.io/en/doc/latest/dev_guide/internals/box_protocol/#greeting-message).
#[derive(Debug)]
pub struct Greeting {
    /// Human-readable server banner, version included.
    pub server: String,
    /// Salt for authentication.
    pub salt: Vec<u8>,
}

impl Greeting {
    /// Size of the full message from server in bytes.
    pub const SIZE: usize = 128;

    /// Offsets of the base64-encoded salt within the greeting.
    const SALT_RANGE: std::ops::Range<usize> = 64..108;

    pub fn decode(buffer: [u8; Self::SIZE]) -> Result<Self, DecodingError> {
        let server = String::from_utf8_lossy(&buffer[0..64])
            .trim_end()
            .to_string();
        let salt = STANDARD
            .decode(&buffer[Self::SALT_RANGE])
            .map_err(|_| DecodingError::greeting("salt is not valid base64"))?;
        Ok(Self { server, salt })
    }
}
