use thiserror::Error;

use crate::protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("no entity `{0}` on this host")]
    UnknownEntity(String),
    #[error("entity `{0}` is read only")]
    ReadOnly(String),
    #[error("`{entity}` has no option `{label}`")]
    UnknownOption { entity: String, label: String },
    #[error("`{entity}` expects a {expected} value")]
    TypeMismatch { entity: String, expected: &'static str },
    #[error("`{0}` cannot be set to a non-finite value")]
    NotFinite(String),
    #[error("write timed out")]
    Timeout,
    #[error("poller is gone")]
    Closed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
