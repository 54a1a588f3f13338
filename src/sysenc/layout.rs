//! Layout summaries that decide whether a value's memory image is its encoding.

use bitflags::bitflags;

bitflags! {
    /// Properties that rule out reinterpreting a value's memory as its encoding.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LayoutFlags: u8 {
        /// Absent value, e.g. `None`.
        const NIL = 0x01;
        /// Holds an address, which has no stable encoding.
        const POINTER = 0x02;
        /// Has gaps between or after fields, including in nested values.
        const PADDING = 0x04;
        /// Has fields that are not part of the public layout.
        const PRIVATE = 0x08;
    }
}

/// In-memory size, packed encoded size and flags of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    size: usize,
    encoded: usize,
    flags: LayoutFlags,
}

impl Layout {
    pub const fn scalar(size: usize) -> Self {
        Self {
            size,
            encoded: size,
            flags: LayoutFlags::empty(),
        }
    }

    pub const fn nil() -> Self {
        Self {
            size: 0,
            encoded: 0,
            flags: LayoutFlags::NIL,
        }
    }

    pub const fn pointer() -> Self {
        Self {
            size: size_of::<usize>(),
            encoded: size_of::<usize>(),
            flags: LayoutFlags::POINTER,
        }
    }

    /// `len` contiguous elements; padding inside an element repeats between entries.
    pub const fn array(element: Layout, len: usize) -> Self {
        Self {
            size: element.size * len,
            encoded: element.encoded * len,
            flags: element.flags,
        }
    }

    pub const fn structure(size: usize) -> StructLayout {
        StructLayout {
            size,
            end: 0,
            encoded: 0,
            flags: LayoutFlags::empty(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn encoded(&self) -> usize {
        self.encoded
    }

    pub fn flags(&self) -> LayoutFlags {
        self.flags
    }

    pub fn is_nil(&self) -> bool {
        self.flags.contains(LayoutFlags::NIL)
    }

    /// True when the memory image, byte for byte, is the encoding.
    pub fn is_plain(&self) -> bool {
        self.flags.is_empty() && self.size == self.encoded
    }
}

/// Accumulates a struct layout from its fields in declaration order.
#[derive(Clone, Copy, Debug)]
pub struct StructLayout {
    size: usize,
    end: usize,
    encoded: usize,
    flags: LayoutFlags,
}

impl StructLayout {
    pub fn field(mut self, offset: usize, layout: Layout) -> Self {
        if offset != self.end {
            self.flags |= LayoutFlags::PADDING;
        }
        self.end = offset + layout.size;
        self.encoded += layout.encoded;
        self.flags |= layout.flags;
        self
    }

    pub fn private_field(self, offset: usize, layout: Layout) -> Self {
        let mut layout = self.field(offset, layout);
        layout.flags |= LayoutFlags::PRIVATE;
        layout
    }

    pub fn finish(self) -> Layout {
        let mut flags = self.flags;
        if self.end != self.size {
            flags |= LayoutFlags::PADDING;
        }
        Layout {
            size: self.size,
            encoded: self.encoded,
            flags,
        }
    }
}
