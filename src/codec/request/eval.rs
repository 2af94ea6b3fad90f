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
pub struct Eval<T> {
    pub expr: String,
    pub args: T,
}

impl<T> Eval<T> {
    pub fn new(expr: impl Into<String>, args: T) -> Self {
        Self {
            expr: expr.into(),
            args,
        }
    }
}

impl<T: Tuple + Send> Request for Eval<T> {
    fn request_type() -> RequestType
    where
        Self: Sized,
    {
        RequestType::Eval
    }

    // NOTE: `&mut buf: mut` is required since I don't get why compiler complain
    fn encode(&self, mut buf: &mut dyn Write) -> Result<(), EncodingError> {
        rmp::encode::write_map_len(&mut buf, 2)?;
        write_kv_str(buf, keys::EXPR, &self.expr)?;
        write_kv_tuple(buf, keys::ARGS, &self.args)?;
        Ok(())
    }
}
