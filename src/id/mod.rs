//! Climatix point IDs.
//!
//! A point is addressed by `(object_type, object_id, member_id)`, packed into
//! 8 bytes (`u16 ‖ u32 ‖ u16`) and Base64 encoded. The two layouts are not
//! interchangeable:
//!
//! - [`Layout::Direct`] (`ID=` on `/JSON.HTML`): big endian, with `+ / =`
//!   replaced by `. _ -`
//! - [`Layout::Generic`] (`OA=` on `/jsongen.html`): little endian, standard
//!   Base64

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::DecodeError;

pub const ID_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Layout {
    Direct,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub struct PointId {
    pub object_type: u16,
    pub object_id: u32,
    pub member_id: u16,
}

/// ID text tagged with the layout that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedId {
    layout: Layout,
    text: String,
    point: PointId,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Direct => f.write_str("direct"),
            Layout::Generic => f.write_str("generic"),
        }
    }
}

impl Layout {
    fn is_foreign_char(self, c: char) -> bool {
        match self {
            Layout::Direct => matches!(c, '+' | '/' | '='),
            Layout::Generic => matches!(c, '.' | '_' | '-'),
        }
    }

    fn to_text(self, b64: String) -> String {
        match self {
            Layout::Direct => b64
                .chars()
                .map(|c| match c {
                    '+' => '.',
                    '/' => '_',
                    '=' => '-',
                    c => c,
                })
                .collect(),
            Layout::Generic => b64,
        }
    }

    fn to_base64(self, text: &str) -> String {
        match self {
            Layout::Direct => text
                .chars()
                .map(|c| match c {
                    '.' => '+',
                    '_' => '/',
                    '-' => '=',
                    c => c,
                })
                .collect(),
            Layout::Generic => text.to_string(),
        }
    }
}

impl PointId {
    /// Checks every field against its bit width.
    pub fn new(object_type: u64, object_id: u64, member_id: u64) -> Result<Self, DecodeError> {
        Ok(Self {
            object_type: narrow("object_type", object_type, 16)? as u16,
            object_id: narrow("object_id", object_id, 32)? as u32,
            member_id: narrow("member_id", member_id, 16)? as u16,
        })
    }

    pub fn to_bytes(self, layout: Layout) -> [u8; ID_BYTES] {
        let mut out = [0u8; ID_BYTES];
        match layout {
            Layout::Direct => {
                out[0..2].copy_from_slice(&self.object_type.to_be_bytes());
                out[2..6].copy_from_slice(&self.object_id.to_be_bytes());
                out[6..8].copy_from_slice(&self.member_id.to_be_bytes());
            }
            Layout::Generic => {
                out[0..2].copy_from_slice(&self.object_type.to_le_bytes());
                out[2..6].copy_from_slice(&self.object_id.to_le_bytes());
                out[6..8].copy_from_slice(&self.member_id.to_le_bytes());
            }
        }
        out
    }

    pub fn from_bytes(layout: Layout, b: [u8; ID_BYTES]) -> Self {
        match layout {
            Layout::Direct => Self {
                object_type: u16::from_be_bytes([b[0], b[1]]),
                object_id: u32::from_be_bytes([b[2], b[3], b[4], b[5]]),
                member_id: u16::from_be_bytes([b[6], b[7]]),
            },
            Layout::Generic => Self {
                object_type: u16::from_le_bytes([b[0], b[1]]),
                object_id: u32::from_le_bytes([b[2], b[3], b[4], b[5]]),
                member_id: u16::from_le_bytes([b[6], b[7]]),
            },
        }
    }

    pub fn encode(self, layout: Layout) -> EncodedId {
        let text = layout.to_text(STANDARD.encode(self.to_bytes(layout)));
        EncodedId {
            layout,
            text,
            point: self,
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.object_type, self.object_id, self.member_id)
    }
}

fn narrow(field: &'static str, value: u64, bits: u32) -> Result<u64, DecodeError> {
    if value >> bits != 0 {
        return Err(DecodeError::FieldOverflow { field, value, bits });
    }
    Ok(value)
}

pub fn encode(
    layout: Layout,
    object_type: u64,
    object_id: u64,
    member_id: u64,
) -> Result<EncodedId, DecodeError> {
    Ok(PointId::new(object_type, object_id, member_id)?.encode(layout))
}

/// Texts that are valid in both alphabets decode with whichever layout is
/// asked for; keeping the [`EncodedId`] around avoids guessing.
pub fn decode(layout: Layout, text: &str) -> Result<PointId, DecodeError> {
    if let Some(found) = text.chars().find(|c| layout.is_foreign_char(*c)) {
        return Err(DecodeError::InvalidCharacter {
            layout,
            text: text.to_string(),
            found,
        });
    }

    let raw = STANDARD
        .decode(layout.to_base64(text))
        .map_err(|e| DecodeError::InvalidBase64 {
            layout,
            text: text.to_string(),
            reason: e.to_string(),
        })?;

    let bytes: [u8; ID_BYTES] = raw.as_slice().try_into().map_err(|_| DecodeError::WrongLength {
        layout,
        text: text.to_string(),
        expected: ID_BYTES,
        got: raw.len(),
    })?;

    Ok(PointId::from_bytes(layout, bytes))
}

impl EncodedId {
    pub fn parse(layout: Layout, text: &str) -> Result<Self, DecodeError> {
        let point = decode(layout, text)?;
        Ok(Self {
            layout,
            text: text.to_string(),
            point,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn point(&self) -> PointId {
        self.point
    }

    /// Same point, other layout.
    pub fn convert(&self, layout: Layout) -> EncodedId {
        self.point.encode(layout)
    }
}

impl fmt::Display for EncodedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_literal() {
        let id = encode(Layout::Direct, 34, 1, 40).unwrap();
        assert_eq!(id.as_str(), "ACIAAAABACg-");
        assert_eq!(
            decode(Layout::Direct, "ACIAAAABACg-").unwrap(),
            PointId { object_type: 34, object_id: 1, member_id: 40 }
        );
    }

    #[test]
    fn test_generic_literal() {
        let id = encode(Layout::Generic, 34, 1, 40).unwrap();
        assert_eq!(id.as_str(), "IgABAAAAKAA=");
        assert_eq!(
            decode(Layout::Generic, "IgABAAAAKAA=").unwrap(),
            PointId { object_type: 34, object_id: 1, member_id: 40 }
        );
    }

    #[test]
    fn test_round_trip_bounds() {
        let samples = [
            (0, 0, 0),
            (u16::MAX as u64, u32::MAX as u64, u16::MAX as u64),
            (0x3e, 0x12345, 0xfb),
            (1, u32::MAX as u64, 0),
        ];
        for layout in [Layout::Direct, Layout::Generic] {
            for (ot, oid, mid) in samples {
                let id = encode(layout, ot, oid, mid).unwrap();
                let p = decode(layout, id.as_str()).unwrap();
                assert_eq!((p.object_type as u64, p.object_id as u64, p.member_id as u64), (ot, oid, mid));
            }
        }
    }

    #[test]
    fn test_direct_special_chars() {
        // 0xff.. produces `/` in standard base64
        let id = encode(Layout::Direct, 0xffff, 0xffff_ffff, 0xffff).unwrap();
        assert_eq!(id.as_str(), "__________8-");

        let id = encode(Layout::Generic, 0xffff, 0xffff_ffff, 0xffff).unwrap();
        assert_eq!(id.as_str(), "//////////8=");
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(matches!(
            encode(Layout::Direct, 1 << 16, 0, 0),
            Err(DecodeError::FieldOverflow { field: "object_type", bits: 16, .. })
        ));
        assert!(matches!(
            encode(Layout::Generic, 0, 1 << 32, 0),
            Err(DecodeError::FieldOverflow { field: "object_id", bits: 32, .. })
        ));
        assert!(matches!(
            encode(Layout::Generic, 0, 0, 70000),
            Err(DecodeError::FieldOverflow { field: "member_id", .. })
        ));
    }

    #[test]
    fn test_wrong_length() {
        // 6 bytes
        assert!(matches!(
            decode(Layout::Generic, "AAAAAAAA"),
            Err(DecodeError::WrongLength { expected: 8, got: 6, .. })
        ));
        // 9 bytes
        assert!(matches!(
            decode(Layout::Direct, "AAAAAAAAAAAA"),
            Err(DecodeError::WrongLength { got: 9, .. })
        ));
        assert!(decode(Layout::Direct, "").is_err());
    }

    #[test]
    fn test_cross_layout_rejected() {
        let generic = encode(Layout::Generic, 34, 1, 40).unwrap();
        assert!(matches!(
            decode(Layout::Direct, generic.as_str()),
            Err(DecodeError::InvalidCharacter { found: '=', .. })
        ));

        let direct = encode(Layout::Direct, 34, 1, 40).unwrap();
        assert!(matches!(
            decode(Layout::Generic, direct.as_str()),
            Err(DecodeError::InvalidCharacter { found: '-', .. })
        ));
    }

    #[test]
    fn test_garbage() {
        assert!(matches!(
            decode(Layout::Generic, "!!!!AAAAAAA="),
            Err(DecodeError::InvalidBase64 { .. })
        ));
    }

    #[test]
    fn test_encoded_id_convert() {
        let direct = EncodedId::parse(Layout::Direct, "ACIAAAABACg-").unwrap();
        let generic = direct.convert(Layout::Generic);
        assert_eq!(generic.layout(), Layout::Generic);
        assert_eq!(generic.as_str(), "IgABAAAAKAA=");
        assert_eq!(generic.point(), direct.point());
    }
}
