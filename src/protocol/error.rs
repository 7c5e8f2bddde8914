use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("request needs at least one id")]
    NoIds,
    #[error("generic endpoint takes one OA per request, got {0}")]
    GenericBatch(usize),
    #[error("invalid request url `{0}`")]
    Url(String),
    #[error("http: {0}")]
    Http(reqwest::Error),
    #[error("timed out")]
    Timeout,
    #[error("controller answered HTTP {0}")]
    Status(u16),
    #[error("response is not JSON: {0}")]
    InvalidJson(String),
    #[error("response has no `values` map")]
    MissingValues,
    #[error("controller reported error {0}")]
    Controller(i64),
    #[error("response is missing id `{0}`")]
    MissingId(String),
    #[error("value for `{0}` is not numeric")]
    NonNumeric(String),
}

impl From<reqwest::Error> for ProtocolError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(value)
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidJson(value.to_string())
    }
}
