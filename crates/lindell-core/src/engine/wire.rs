//! Binary interchange for engine messages
//!
//! Layout: `version (1 byte) || tag (1 byte) || bincode body`.

use super::{Round2Result, ServerFirstMessage};
use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

pub const WIRE_VERSION: u8 = 1;

/// A message that can cross the engine boundary
pub trait WireMessage: Serialize + DeserializeOwned {
    const TAG: u8;
    const NAME: &'static str;
}

impl WireMessage for ServerFirstMessage {
    const TAG: u8 = 1;
    const NAME: &'static str = "server first message";
}

impl WireMessage for Round2Result {
    const TAG: u8 = 2;
    const NAME: &'static str = "client round result";
}

pub fn encode<T: WireMessage>(value: &T) -> Result<Vec<u8>> {
    let body = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(WIRE_VERSION);
    out.push(T::TAG);
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode<T: WireMessage>(bytes: &[u8]) -> Result<T> {
    let (header, body) = match bytes {
        [version, tag, body @ ..] => ((*version, *tag), body),
        _ => {
            return Err(Error::MalformedMessage(format!("{}: truncated header", T::NAME)));
        }
    };

    if header.0 != WIRE_VERSION {
        return Err(Error::MalformedMessage(format!(
            "{}: unsupported version {}",
            T::NAME,
            header.0
        )));
    }
    if header.1 != T::TAG {
        return Err(Error::MalformedMessage(format!(
            "{}: expected tag {}, got {}",
            T::NAME,
            T::TAG,
            header.1
        )));
    }

    let (value, read) = bincode::serde::decode_from_slice::<T, _>(body, bincode::config::standard())
        .map_err(|e| Error::MalformedMessage(format!("{}: {}", T::NAME, e)))?;
    if read != body.len() {
        return Err(Error::MalformedMessage(format!(
            "{}: {} trailing bytes",
            T::NAME,
            body.len() - read
        )));
    }
    Ok(value)
}
