//! The byte arena backing every parsed value graph.
//!
//! A parsed source unit is a single contiguous buffer of fixed-size records
//! (16 bytes each: tag, flags, payload) plus packed `u64` offset arrays for
//! list elements. Children are always written before their containers, so the
//! graph is acyclic by construction: every offset stored inside a record
//! points strictly backwards.
//!
//! The arena is append-only while a [`ArenaBuilder`] owns it and immutable
//! once frozen into an [`std::sync::Arc`]; sub-views into a frozen arena are
//! just `(buffer, offset)` pairs.

use strum::{Display, EnumString, FromRepr, IntoStaticStr};

/// Size in bytes of one unit of store.
pub const UNIT_SIZE: usize = 16;

/// Tag identifying what a unit of store holds.
///
/// The discriminants are the on-the-wire header values shared with the
/// native-kernel ABI and must never be renumbered. The string forms are the
/// names used by `:type` symbols in source code.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, FromRepr, IntoStaticStr)]
pub enum Kind {
    #[strum(serialize = "none")]
    None = 0,
    #[strum(serialize = "some")]
    Some = 1,
    #[strum(serialize = "list-p")]
    ParenList = 2,
    #[strum(serialize = "list-c")]
    BraceList = 4,
    #[strum(serialize = "str")]
    Str = 5,
    #[strum(serialize = "symbol")]
    Symbol = 7,
    #[strum(serialize = "rune")]
    Rune = 8,
    #[strum(serialize = "int")]
    Int = 9,
    #[strum(serialize = "real")]
    Real = 10,
    #[strum(serialize = "list-b")]
    BracketList = 11,
    #[strum(serialize = "error")]
    Error = 12,
    #[strum(serialize = "datum")]
    Datum = 13,
    #[strum(serialize = "aberrant")]
    Aberrant = 14,
}

impl Kind {
    /// True for the three list kinds.
    #[must_use]
    pub fn is_list(self) -> bool {
        matches!(self, Self::ParenList | Self::BracketList | Self::BraceList)
    }

    /// True for kinds whose payload is an offset to a single wrapped value.
    #[must_use]
    pub fn is_wrapper(self) -> bool {
        matches!(self, Self::Some | Self::Error | Self::Datum)
    }
}

/// One decoded unit of store.
///
/// Units are read out of the arena by value; the payload is interpreted
/// according to the tag (signed integer, float bits, symbol id, lambda id, or
/// arena offset).
#[derive(Debug, Clone, Copy)]
pub struct Unit {
    pub tag: u32,
    pub flags: u32,
    pub payload: u64,
}

impl Unit {
    /// The decoded kind, or `None` for an unknown tag.
    #[must_use]
    pub fn kind(&self) -> Option<Kind> {
        Kind::from_repr(self.tag)
    }
}

/// Append-only byte buffer of unit records and offset arrays.
#[derive(Debug, Default, Clone)]
pub struct ArenaBuf {
    bytes: Vec<u8>,
}

impl ArenaBuf {
    pub(crate) fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Total length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends a unit record and returns its offset.
    pub(crate) fn push_unit(&mut self, kind: Kind, flags: u32, payload: u64) -> usize {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(&(kind as u32).to_le_bytes());
        self.bytes.extend_from_slice(&flags.to_le_bytes());
        self.bytes.extend_from_slice(&payload.to_le_bytes());
        offset
    }

    /// Appends a packed array of element offsets and returns its position.
    pub(crate) fn push_offsets(&mut self, offsets: &[usize]) -> usize {
        let position = self.bytes.len();
        for offset in offsets {
            self.bytes.extend_from_slice(&(*offset as u64).to_le_bytes());
        }
        position
    }

    /// Overwrites the payload field of the unit at `unit_offset`.
    pub(crate) fn patch_payload(&mut self, unit_offset: usize, payload: u64) {
        let start = unit_offset + 8;
        if let Some(slice) = self.bytes.get_mut(start..start + 8) {
            slice.copy_from_slice(&payload.to_le_bytes());
        }
    }

    /// Reads the unit record at `offset`; fails when the record would run off
    /// the end of the buffer.
    #[must_use]
    pub fn unit(&self, offset: usize) -> Option<Unit> {
        let end = offset.checked_add(UNIT_SIZE)?;
        let slice = self.bytes.get(offset..end)?;
        Some(Unit {
            tag: u32::from_le_bytes(slice[0..4].try_into().ok()?),
            flags: u32::from_le_bytes(slice[4..8].try_into().ok()?),
            payload: u64::from_le_bytes(slice[8..16].try_into().ok()?),
        })
    }

    /// Reads entry `index` of the offset array at `array_pos`.
    #[must_use]
    pub fn offset_entry(&self, array_pos: usize, index: usize) -> Option<usize> {
        let start = array_pos.checked_add(index.checked_mul(8)?)?;
        let slice = self.bytes.get(start..start.checked_add(8)?)?;
        let raw = u64::from_le_bytes(slice.try_into().ok()?);
        usize::try_from(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_round_trip() {
        let mut buf = ArenaBuf::new();
        let a = buf.push_unit(Kind::Int, 0, 41u64);
        let b = buf.push_unit(Kind::Real, 7, 2.5f64.to_bits());
        assert_eq!(a, 0);
        assert_eq!(b, UNIT_SIZE);

        let ua = buf.unit(a).unwrap();
        assert_eq!(ua.kind(), Some(Kind::Int));
        assert_eq!(ua.payload, 41);

        let ub = buf.unit(b).unwrap();
        assert_eq!(ub.kind(), Some(Kind::Real));
        assert_eq!(ub.flags, 7);
        assert_eq!(f64::from_bits(ub.payload), 2.5);
    }

    #[test]
    fn unit_read_past_end_fails() {
        let mut buf = ArenaBuf::new();
        buf.push_unit(Kind::Int, 0, 1);
        assert!(buf.unit(UNIT_SIZE).is_none());
        assert!(buf.unit(usize::MAX).is_none());
    }

    #[test]
    fn offset_array_round_trip() {
        let mut buf = ArenaBuf::new();
        let a = buf.push_unit(Kind::Int, 0, 1);
        let b = buf.push_unit(Kind::Int, 0, 2);
        let pos = buf.push_offsets(&[a, b]);
        assert_eq!(buf.offset_entry(pos, 0), Some(a));
        assert_eq!(buf.offset_entry(pos, 1), Some(b));
    }

    #[test]
    fn kind_names_match_type_symbols() {
        assert_eq!(Kind::Int.to_string(), "int");
        assert_eq!(Kind::BraceList.to_string(), "list-c");
        assert_eq!("list-b".parse::<Kind>().unwrap(), Kind::BracketList);
        assert_eq!("aberrant".parse::<Kind>().unwrap(), Kind::Aberrant);
    }
}
