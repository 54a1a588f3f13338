use std::io;

use thiserror::Error;

use super::builder::TypeId;
use crate::features::KernelVersion;

pub type BtfResult<T> = Result<T, BtfError>;

#[derive(Debug, Error)]
pub enum BtfError {
    /// Bulk builder input violated the ID invariants.
    #[error("invalid builder input: {0}")]
    Construction(String),
    #[error("malformed BTF: {0}")]
    Format(#[from] FormatError),
    /// A type in the graph cannot be represented on the wire.
    #[error("cannot encode type {id}: {reason}")]
    Encode { id: TypeId, reason: String },
    #[error("string {0:?} contains a NUL byte")]
    InvalidString(String),
    #[error("type ID space exhausted")]
    IdOverflow,
    #[error("invalid kernel release {0:?}")]
    InvalidRelease(String),
    /// The running kernel lacks a capability the operation needs.
    #[error("{feature} is not supported (requires kernel {requires})")]
    Unsupported {
        feature: &'static str,
        requires: KernelVersion,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl BtfError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BtfError::Unsupported { .. })
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        BtfError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Reasons the loader rejects a buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("{what} truncated at offset {offset}: need {needed} more bytes")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
    },
    #[error("unknown magic 0x{0:04x}")]
    BadMagic(u16),
    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),
    #[error("unsupported header flags 0x{0:02x}")]
    UnsupportedFlags(u8),
    #[error("header length {0} is shorter than the fixed header")]
    HeaderTooShort(u32),
    #[error("header extension contains non-zero bytes")]
    NonZeroHeaderExtension,
    #[error("{section} section ends at {end}, beyond buffer of {len} bytes")]
    SectionOutOfBounds {
        section: &'static str,
        end: u64,
        len: usize,
    },
    #[error("string table is empty")]
    EmptyStringTable,
    #[error("first item in string table is non-empty")]
    StringTableStart,
    #[error("string table isn't null terminated")]
    StringTableUnterminated,
    #[error("string offset {0} is beyond the string table")]
    StringOffsetOutOfRange(u32),
    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(u32),
    #[error("type {id} references type {target}, but only {count} types exist")]
    TypeIdOutOfRange { id: u32, target: u32, count: u32 },
    #[error("type {id} has unknown kind {kind}")]
    UnknownKind { id: u32, kind: u8 },
    #[error("type {id} has unknown linkage {linkage}")]
    UnknownLinkage { id: u32, linkage: u32 },
    #[error("int {id} has unsupported bit offset {offset}")]
    IntBitOffset { id: u32, offset: u8 },
}
