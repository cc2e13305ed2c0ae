use bytes::Bytes;

use super::Error;
use crate::types::Model;

const COMPRESSION_LEVEL: i32 = 3;

/// Packages a model into a compressed blob
pub fn encode_model(model: &Model) -> Result<Bytes, Error> {
    let raw = bincode::serde::encode_to_vec(model, bincode::config::standard())?;
    Ok(Bytes::from(zstd::encode_all(raw.as_slice(), COMPRESSION_LEVEL)?))
}

pub fn decode_model(content: &[u8]) -> Result<Model, Error> {
    let raw = zstd::decode_all(content)?;
    let (model, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())?;
    Ok(model)
}
