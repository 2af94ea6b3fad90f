use std::io::Write;

use crate::{
    codec::{
        consts::{keys, RequestType},
        utils::{write_kv_str, write_kv_tuple},
    },
    errors::EncodingError,
    tuple::Tuple,
};

use super::Request;

#[derive(Clone, Debug)]
pub struct Call<T> {
    pub function_name: String,
    pub args: T,
}

impl<T> Call<T> {
    pub fn new(function_name: impl Into<String>, args: T) -> Self {
        Self {
            function_name: function_name.into(),
            args,
        }
    }
}

impl<T: Tuple + Send> Request for Call<T> {
    fn request_type() -> RequestType
    where
        Self: Sized,
    {
        RequestType::Call
    }

    // NOTE: `&mut buf: mut` is required since I don't get why compiler complain
    fn encode(&self, mut buf: &mut dyn Write) -> Result<(), EncodingError> {
        rmp::encode::write_map_len(&mut buf, 2)?;
        write_kv_str(buf, keys::FUNCTION_NAME, &self.function_name)?;
        write_kv_tuple(buf, keys::ARGS, &self.args)?;
        Ok(())
    }
}

/// Legacy CALL request, wrapping each result value into a tuple.
#[derive(Clone, Debug)]
pub struct Call16<T> {
    pub function_name: String,
    pub args: T,
}

impl<T> Call16<T> {
    pub fn new(function_name: impl Into<String>, args: T) -> Self {
        Self {
            function_name: function_name.into(),
            args,
        }
    }
}

impl<T: Tuple + Send> Request for Call16<T> {
    fn request_type() -> RequestType
    where
        Self: Sized,
    {
        RequestType::Call16
    }

    // NOTE: `&mut buf: mut` is required since I don't get why compiler complain
    fn encode(&self, mut buf: &mut dyn Write) -> Result<(), EncodingError> {
        rmp::encode::write_map_len(&mut buf, 2)?;
        write_kv_str(buf, keys::FUNCTION_NAME, &self.function_name)?;
        write_kv_tuple(buf, keys::ARGS, &self.args)?;
        Ok(())
    }
}
