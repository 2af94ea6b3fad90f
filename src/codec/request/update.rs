use std::io::Write;

use crate::{
    codec::{
        consts::{keys, RequestType},
        utils::{write_kv_tuple, write_kv_u32},
    },
    errors::EncodingError,
    tuple::Tuple,
};

use super::Request;

#[derive(Clone, Debug)]
pub struct Update<K, O> {
    pub space_id: u32,
    pub index_id: u32,
    pub keys: K,
    pub ops: O,
}

impl<K, O> Update<K, O> {
    pub fn new(space_id: u32, index_id: u32, keys: K, ops: O) -> Self {
        Self {
            space_id,
            index_id,
            keys,
            ops,
        }
    }
}

impl<K: Tuple + Send, O: Tuple + Send> Request for Update<K, O> {
    fn request_type() -> RequestType
    where
        Self: Sized,
    {
        RequestType::Update
    }

    // NOTE: `&mut buf: mut` is required since I don't get why compiler complain
    fn encode(&self, mut buf: &mut dyn Write) -> Result<(), EncodingError> {
        rmp::encode::write_map_len(&mut buf, 4)?;
        write_kv_u32(buf, keys::SPACE_ID, self.space_id)?;
        write_kv_u32(buf, keys::INDEX_ID, self.index_id)?;
        write_kv_tuple(buf, keys::KEY, &self.keys)?;
        write_kv_tuple(buf, keys::OPS, &self.ops)?;
        Ok(())
    }
}
