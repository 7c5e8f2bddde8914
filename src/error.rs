use thiserror::Error;

use crate::id::{DecodeError, Layout};

/// Setup-time failure for a single entity. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("`{0}` has no {1} read or write id")]
    NoPointId(String, Layout),
    #[error("`{entity}` option `{label}` has no numeric value")]
    UnmappedOption { entity: String, label: String },
    #[error("`{entity}` lists option `{label}` twice")]
    DuplicateOption { entity: String, label: String },
    #[error("`{0}` is enumerated but has no options")]
    NoOptions(String),
    #[error("`{entity}` has an invalid range [{min}, {max}]")]
    InvalidRange { entity: String, min: f64, max: f64 },
    #[error("`{entity}` has a non-positive step {step}")]
    InvalidStep { entity: String, step: f64 },
    #[error("`{0}` has an invalid id: {1}")]
    InvalidId(String, DecodeError),
    #[error("entity key `{0}` is used twice")]
    DuplicateEntity(String),
    #[error("no binding matches name `{name}` / context `{context}`")]
    NoMatchingBinding { name: String, context: String },
    #[error("pick {pick} is out of range, only {found} bindings matched")]
    PickOutOfRange { pick: usize, found: usize },
    #[error("entity `{0}` needs a bundle, but its host has none")]
    MissingBundle(String),
}
