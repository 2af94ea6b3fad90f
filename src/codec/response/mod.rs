use std::io::Read;

use bytes::{Buf, BytesMut};
use rmpv::Value;
use tracing::debug;

use crate::{
    codec::consts::{keys, response_codes},
    errors::{DecodingError, ErrorResponse},
};

#[derive(Clone, Debug)]
pub enum ResponseBody {
    Ok(Value),
    Error(ErrorResponse),
}

#[derive(Clone, Debug)]
pub struct Response {
    pub sync: u32,
    pub schema_version: u32,
    pub body: ResponseBody,
}

impl Response {
    /// Decode a single frame (without the length prefix) into a response.
    pub(crate) fn decode(frame: BytesMut) -> Result<Self, DecodingError> {
        let mut buf = frame.reader();
        let map_len = rmp::decode::read_map_len(&mut buf)
            .map_err(DecodingError::from)
            .map_err(|err| err.in_location("response header"))?;
        let mut response_code: Option<u32> = None;
        let mut sync: Option<u32> = None;
        let mut schema_version: Option<u32> = None;
        for _ in 0..map_len {
            let key: u8 = rmp::decode::read_pfix(&mut buf)?;
            match key {
                keys::RESPONSE_CODE => {
                    response_code = Some(rmp::decode::read_int(&mut buf)?);
                }
                keys::SYNC => {
                    sync = Some(rmp::decode::read_int(&mut buf)?);
                }
                keys::SCHEMA_VERSION => {
                    schema_version = Some(rmp::decode::read_int(&mut buf)?);
                }
                rest => {
                    debug!("Unexpected key encountered in response header: {}", rest);
                    let _ = rmpv::decode::read_value(&mut buf)?;
                }
            }
        }
        let response_code = response_code
            .ok_or_else(|| DecodingError::missing_key("RESPONSE_CODE").in_location("response header"))?;
        let sync =
            sync.ok_or_else(|| DecodingError::missing_key("SYNC").in_location("response header"))?;
        let body = match response_code {
            response_codes::OK => ResponseBody::Ok(Self::decode_ok_body(&mut buf)?),
            code => {
                let code = code & response_codes::ERROR_CLASS_MASK;
                ResponseBody::Error(Self::decode_error_body(&mut buf, code)?)
            }
        };
        Ok(Self {
            sync,
            schema_version: schema_version.unwrap_or(0),
            body,
        })
    }

    fn decode_ok_body(buf: &mut bytes::buf::Reader<BytesMut>) -> Result<Value, DecodingError> {
        if buf.get_ref().has_remaining() {
            Ok(rmpv::decode::read_value(buf)?)
        } else {
            Ok(Value::Nil)
        }
    }

    fn decode_error_body(
        buf: &mut impl Read,
        code: u32,
    ) -> Result<ErrorResponse, DecodingError> {
        let mut description = None;
        let mut extra = None;
        let map_len = rmp::decode::read_map_len(buf)
            .map_err(DecodingError::from)
            .map_err(|err| err.in_location("error response body"))?;
        for _ in 0..map_len {
            let key: u8 = rmp::decode::read_pfix(buf)?;
            match key {
                keys::ERROR_24 => match rmpv::decode::read_value(buf)? {
                    Value::String(x) => {
                        description = x.into_str();
                    }
                    rest => {
                        return Err(DecodingError::type_mismatch("string", rest.to_string())
                            .in_location("error response body"))
                    }
                },
                keys::ERROR => {
                    extra = Some(rmpv::decode::read_value(buf)?);
                }
                rest => {
                    debug!("Unexpected key encountered in error response body: {}", rest);
                    let _ = rmpv::decode::read_value(buf)?;
                }
            }
        }
        let description = description
            .ok_or_else(|| DecodingError::missing_key("ERROR_24").in_location("error response body"))?;
        Ok(ErrorResponse::new(code, description, extra))
    }
}
