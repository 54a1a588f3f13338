//! Fixed-layout encoding of values passed to and from system calls.
//!
//! Values whose memory image is exactly their packed encoding are used in
//! place; everything else is packed field by field into a fresh buffer.

pub mod buffer;
pub mod encode;
pub mod error;
pub mod layout;

pub use buffer::{Buffer, OutputBuffer};
pub use encode::{Element, Encode};
pub use error::{SysencError, SysencResult};
pub use layout::{Layout, LayoutFlags, StructLayout};

use buffer::Target;

fn check_encodable(layout: &Layout) -> SysencResult<()> {
    if layout.flags().contains(LayoutFlags::NIL) {
        return Err(SysencError::Nil);
    }
    if layout.flags().contains(LayoutFlags::POINTER) {
        return Err(SysencError::NotEncodable("pointer"));
    }
    Ok(())
}

/// True when `value`'s memory can be handed out as its encoding.
pub fn supports_direct_memory<E: Encode + ?Sized>(value: &E) -> bool {
    value.layout().is_plain() && value.plain_bytes().is_some()
}

/// Encodes `value` into exactly `size` bytes.
pub fn encode<E: Encode + ?Sized>(value: &E, size: usize) -> SysencResult<Buffer<'_>> {
    let layout = value.layout();
    check_encodable(&layout)?;
    if layout.encoded() != size {
        return Err(SysencError::SizeMismatch {
            expected: size,
            actual: layout.encoded(),
        });
    }
    if layout.is_plain() {
        if let Some(bytes) = value.plain_bytes() {
            return Ok(Buffer::Borrowed(bytes));
        }
    }
    let mut out = Vec::with_capacity(size);
    value.encode_fields(&mut out)?;
    if out.len() != size {
        return Err(SysencError::SizeMismatch {
            expected: size,
            actual: out.len(),
        });
    }
    Ok(Buffer::Owned(out))
}

/// Overwrites `dst` with the encoding in `buf`.
pub fn decode<E: Encode + ?Sized>(dst: &mut E, buf: &[u8]) -> SysencResult<()> {
    let layout = dst.layout();
    check_encodable(&layout)?;
    if layout.encoded() != buf.len() {
        return Err(SysencError::LayoutMismatch {
            expected: layout.encoded(),
            actual: buf.len(),
        });
    }
    if layout.is_plain() {
        if let Some(bytes) = dst.plain_bytes_mut() {
            bytes.copy_from_slice(buf);
            return Ok(());
        }
    }
    let mut input = buf;
    dst.decode_fields(&mut input)?;
    if !input.is_empty() {
        return Err(SysencError::LayoutMismatch {
            expected: layout.encoded(),
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Prepares `size` bytes for a system call to fill in on behalf of `dst`.
pub fn syscall_output<E: Encode + ?Sized>(
    dst: &mut E,
    size: usize,
) -> SysencResult<OutputBuffer<'_, E>> {
    let layout = dst.layout();
    check_encodable(&layout)?;
    if layout.encoded() != size {
        return Err(SysencError::SizeMismatch {
            expected: size,
            actual: layout.encoded(),
        });
    }
    let target = if supports_direct_memory(dst) {
        match dst.plain_bytes_mut() {
            Some(bytes) => Target::Direct(bytes),
            None => return Err(SysencError::NotEncodable("value without a memory view")),
        }
    } else {
        Target::Scratch {
            dst,
            buf: vec![0; size],
        }
    };
    Ok(OutputBuffer { target })
}
