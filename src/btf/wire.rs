//! Fixed pieces of the BTF binary layout: header, kind tags and the packed info word.
//!
//! A buffer is laid out as
//!
//! ```text
//! +--------+----------------------------+--------------+
//! | header | type records (ID 1, 2, ..) | string table |
//! +--------+----------------------------+--------------+
//! ```
//!
//! Every record starts with `{name_off: u32, info: u32, size_or_type: u32}`
//! followed by kind-specific data. Void (ID 0) is implicit and never stored.

use super::error::{BtfResult, FormatError};
use crate::endianness::Endianness;

pub const MAGIC: u16 = 0xEB9F;
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 12;

/// BTF type kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Unknown = 0,
    Int = 1,
    Pointer = 2,
    Array = 3,
    Struct = 4,
    Union = 5,
    Enum = 6,
    Fwd = 7,
    Typedef = 8,
    Volatile = 9,
    Const = 10,
    Restrict = 11,
    Func = 12,
    FuncProto = 13,
    Var = 14,
    Datasec = 15,
    Float = 16,
    DeclTag = 17,
    TypeTag = 18,
    Enum64 = 19,
}

impl Kind {
    pub fn from_raw(raw: u8) -> Option<Self> {
        let kind = match raw {
            1 => Kind::Int,
            2 => Kind::Pointer,
            3 => Kind::Array,
            4 => Kind::Struct,
            5 => Kind::Union,
            6 => Kind::Enum,
            7 => Kind::Fwd,
            8 => Kind::Typedef,
            9 => Kind::Volatile,
            10 => Kind::Const,
            11 => Kind::Restrict,
            12 => Kind::Func,
            13 => Kind::FuncProto,
            14 => Kind::Var,
            15 => Kind::Datasec,
            16 => Kind::Float,
            17 => Kind::DeclTag,
            18 => Kind::TypeTag,
            19 => Kind::Enum64,
            _ => return None,
        };
        Some(kind)
    }

    /// Size of the data trailing the record header, given its vlen.
    pub fn data_len(self, vlen: u16) -> usize {
        let vlen = vlen as usize;
        match self {
            Kind::Int | Kind::Var | Kind::DeclTag => 4,
            Kind::Array => 12,
            Kind::Struct | Kind::Union => 12 * vlen,
            Kind::Enum => 8 * vlen,
            Kind::Enum64 => 12 * vlen,
            Kind::FuncProto => 8 * vlen,
            Kind::Datasec => 12 * vlen,
            _ => 0,
        }
    }
}

/// The packed `info` word: vlen in bits 0-15, kind in bits 24-28, kind_flag in bit 31.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Info(u32);

impl Info {
    const VLEN_MASK: u32 = 0xffff;
    const KIND_SHIFT: u32 = 24;
    const KIND_MASK: u32 = 0x1f;
    const KIND_FLAG: u32 = 1 << 31;

    pub fn new(kind: Kind, vlen: u16, kind_flag: bool) -> Self {
        let mut raw = (vlen as u32) | ((kind as u32) << Self::KIND_SHIFT);
        if kind_flag {
            raw |= Self::KIND_FLAG;
        }
        Self(raw)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn kind_raw(self) -> u8 {
        ((self.0 >> Self::KIND_SHIFT) & Self::KIND_MASK) as u8
    }

    pub fn vlen(self) -> u16 {
        (self.0 & Self::VLEN_MASK) as u16
    }

    pub fn kind_flag(self) -> bool {
        self.0 & Self::KIND_FLAG != 0
    }
}

/// Int data word: encoding in bits 24-27, bit offset in 16-23, bit count in 0-7.
pub fn int_data(encoding: u8, offset: u8, bits: u8) -> u32 {
    ((encoding as u32 & 0x0f) << 24) | ((offset as u32) << 16) | bits as u32
}

pub fn split_int_data(raw: u32) -> (u8, u8, u8) {
    (((raw >> 24) & 0x0f) as u8, (raw >> 16) as u8, raw as u8)
}

/// Member offset word when the owning composite has kind_flag set.
pub fn bitfield_offset(bitfield_size: u8, offset_bits: u32) -> u32 {
    ((bitfield_size as u32) << 24) | (offset_bits & 0x00ff_ffff)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub magic: u16,
    pub version: u8,
    pub flags: u8,
    pub hdr_len: u32,
    /// Offsets are relative to the end of the header.
    pub type_off: u32,
    pub type_len: u32,
    pub str_off: u32,
    pub str_len: u32,
}

impl Header {
    pub fn new(type_len: u32, str_len: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            hdr_len: HEADER_LEN as u32,
            type_off: 0,
            type_len,
            str_off: type_len,
            str_len,
        }
    }

    pub fn to_bytes(&self, order: Endianness) -> [u8; HEADER_LEN] {
        let mut out = Vec::with_capacity(HEADER_LEN);
        order.put_u16(&mut out, self.magic);
        out.push(self.version);
        out.push(self.flags);
        for word in [
            self.hdr_len,
            self.type_off,
            self.type_len,
            self.str_off,
            self.str_len,
        ] {
            order.put_u32(&mut out, word);
        }
        let mut bytes = [0u8; HEADER_LEN];
        bytes.copy_from_slice(&out);
        bytes
    }

    /// Parses and validates the fixed header; the magic must match `order`.
    pub fn parse(bytes: &[u8], order: Endianness) -> BtfResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(FormatError::Truncated {
                what: "header",
                offset: 0,
                needed: HEADER_LEN - bytes.len(),
            }
            .into());
        }
        let magic = order.u16_from([bytes[0], bytes[1]]);
        if magic != MAGIC {
            return Err(FormatError::BadMagic(magic).into());
        }
        let word = |at: usize| {
            let raw = [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
            order.u32_from(raw)
        };
        let header = Self {
            magic,
            version: bytes[2],
            flags: bytes[3],
            hdr_len: word(4),
            type_off: word(8),
            type_len: word(12),
            str_off: word(16),
            str_len: word(20),
        };
        if header.version != VERSION {
            return Err(FormatError::UnsupportedVersion(header.version).into());
        }
        if header.flags != 0 {
            return Err(FormatError::UnsupportedFlags(header.flags).into());
        }
        if (header.hdr_len as usize) < HEADER_LEN {
            return Err(FormatError::HeaderTooShort(header.hdr_len).into());
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::btf::BtfError;

    #[test]
    fn info_packs_kind_vlen_and_flag() {
        let info = Info::new(Kind::Union, 3, true);
        assert_eq!(
            info.raw(),
            0x8500_0003,
            "kind 5 in bits 24-28, flag in bit 31"
        );
        assert_eq!(info.kind_raw(), Kind::Union as u8);
        assert_eq!(info.vlen(), 3);
        assert!(info.kind_flag());
    }

    #[test]
    fn kind_from_raw_rejects_unknown_tags() {
        assert_eq!(Kind::from_raw(19), Some(Kind::Enum64));
        assert_eq!(Kind::from_raw(0), None, "kind 0 never appears in a record");
        assert_eq!(Kind::from_raw(20), None, "tags past Enum64 are unknown");
    }

    #[test]
    fn int_data_matches_kernel_layout() {
        // signed 32-bit int: encoding 1 in bits 24-27, 32 bits
        assert_eq!(int_data(1, 0, 32), 0x0100_0020);
        assert_eq!(split_int_data(0x0100_0020), (1, 0, 32));
    }

    #[test]
    fn header_serializes_little_endian() {
        let header = Header::new(16, 5);
        let bytes = header.to_bytes(Endianness::Little);
        assert_eq!(
            bytes,
            hex!("9feb0100 18000000 00000000 10000000 10000000 05000000"),
            "header layout must match the kernel's struct btf_header"
        );
        assert_eq!(Header::parse(&bytes, Endianness::Little).unwrap(), header);
    }

    #[test]
    fn header_rejects_wrong_byte_order() {
        let bytes = Header::new(0, 1).to_bytes(Endianness::Big);
        let err = Header::parse(&bytes, Endianness::Little).unwrap_err();
        assert!(
            matches!(err, BtfError::Format(FormatError::BadMagic(0x9feb))),
            "magic read in the wrong order should be rejected, got {err}"
        );
    }

    #[test]
    fn header_rejects_short_input() {
        let err = Header::parse(&[0x9f, 0xeb], Endianness::Little).unwrap_err();
        assert!(matches!(
            err,
            BtfError::Format(FormatError::Truncated { what: "header", .. })
        ));
    }
}
