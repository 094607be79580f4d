use chrono::ParseError as ChronoError;
use serde_json::Error as JsonError;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt::Display;

use crate::model::ChannelId;

/// Discord state `Result` alias type.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Discord state error type.
#[derive(Debug)]
pub enum Error {
    /// A `serde_json` crate error
    Json(JsonError),
    /// A `chrono` crate error
    Chrono(ChronoError),
    /// A json decoding error, with a description and the offending value
    Decode(&'static str, Value),
    /// A channel was referenced that is not part of the server it was looked up in
    UnknownChannel(ChannelId),
    /// The operation is not available for this entity, with a description
    ///
    /// Returned when refreshing an entity whose authoritative state is
    /// maintained by the gateway.
    NotSupported(&'static str),
    /// A failure reported by a fetch collaborator, passed through unchanged
    Fetch(Box<dyn StdError + Send + Sync>),
    /// A miscellaneous error, with a description
    Other(&'static str),
}

impl Error {
    /// Wrap a collaborator failure so it can travel through this crate's `Result`.
    pub fn fetch<E: StdError + Send + Sync + 'static>(err: E) -> Error {
        Error::Fetch(Box::new(err))
    }
}

impl From<JsonError> for Error {
    fn from(err: JsonError) -> Error {
        Error::Json(err)
    }
}

impl From<ChronoError> for Error {
    fn from(err: ChronoError) -> Error {
        Error::Chrono(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match *self {
            Error::Json(ref inner) => inner.fmt(f),
            Error::Chrono(ref inner) => inner.fmt(f),
            Error::Fetch(ref inner) => inner.fmt(f),
            Error::Decode(msg, _) => write!(f, "Decode error: {}", msg),
            Error::UnknownChannel(id) => write!(f, "Unknown channel {}", id),
            Error::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            Error::Other(msg) => f.write_str(msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::Json(ref inner) => Some(inner),
            Error::Chrono(ref inner) => Some(inner),
            Error::Fetch(ref inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}
