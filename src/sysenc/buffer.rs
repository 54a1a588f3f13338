use std::ops::Deref;

use super::encode::Encode;
use super::error::SysencResult;

/// Encoded bytes, either borrowed from the source value or freshly packed.
///
/// A borrowed buffer aliases the source's memory. The borrow keeps the source
/// from being mutated while the buffer lives; code that hands the bytes to the
/// kernel as a raw pointer must not let the kernel retain it past that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Buffer<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl Buffer<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Buffer::Borrowed(bytes) => *bytes,
            Buffer::Owned(bytes) => bytes.as_slice(),
        }
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self, Buffer::Borrowed(_))
    }

    /// Copies as much as fits into `dst` and returns the number of bytes copied.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let bytes = self.as_bytes();
        let len = bytes.len().min(dst.len());
        dst[..len].copy_from_slice(&bytes[..len]);
        len
    }

    pub fn into_owned(self) -> Vec<u8> {
        match self {
            Buffer::Borrowed(bytes) => bytes.to_vec(),
            Buffer::Owned(bytes) => bytes,
        }
    }
}

impl Deref for Buffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for Buffer<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

pub(crate) enum Target<'a, E: Encode + ?Sized> {
    Direct(&'a mut [u8]),
    Scratch { dst: &'a mut E, buf: Vec<u8> },
}

/// Bytes a system call writes its result into, bound to a destination value.
///
/// When the destination is plain the bytes are its own memory; otherwise they
/// are a scratch buffer that [`OutputBuffer::finish`] decodes into it.
pub struct OutputBuffer<'a, E: Encode + ?Sized> {
    pub(crate) target: Target<'a, E>,
}

impl<E: Encode + ?Sized> OutputBuffer<'_, E> {
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.target {
            Target::Direct(bytes) => &mut bytes[..],
            Target::Scratch { buf, .. } => &mut buf[..],
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.target, Target::Direct(_))
    }

    pub fn finish(self) -> SysencResult<()> {
        match self.target {
            Target::Direct(_) => Ok(()),
            Target::Scratch { dst, buf } => super::decode(dst, &buf),
        }
    }
}
