//! Decoder boundary: response body to typed records.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unexpected payload: {0}")]
    Unexpected(String),
}

impl DecodeError {
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }
}

pub trait Decode<T> {
    fn decode(&self, body: &[u8]) -> Result<T, DecodeError>;
}

/// Decodes a JSON body straight into `T`.
#[derive(Debug)]
pub struct JsonDecoder<T>(PhantomData<fn() -> T>);

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decode<T> for JsonDecoder<T> {
    fn decode(&self, body: &[u8]) -> Result<T, DecodeError> {
        decode_json(body)
    }
}

pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::unexpected("empty body"));
    }
    Ok(serde_json::from_slice(body)?)
}
