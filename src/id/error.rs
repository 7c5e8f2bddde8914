use thiserror::Error;

use super::Layout;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{layout} id `{text}` contains `{found}`, which is outside its alphabet")]
    InvalidCharacter {
        layout: Layout,
        text: String,
        found: char,
    },
    #[error("{layout} id `{text}` is not valid base64: {reason}")]
    InvalidBase64 {
        layout: Layout,
        text: String,
        reason: String,
    },
    #[error("{layout} id `{text}` decodes to {got} bytes, expected {expected}")]
    WrongLength {
        layout: Layout,
        text: String,
        expected: usize,
        got: usize,
    },
    #[error("{field} value {value} does not fit in {bits} bits")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        bits: u32,
    },
}
