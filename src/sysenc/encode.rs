//! Per-type encoding rules.
//!
//! The encoding of a value is its fields packed back to back in native byte
//! order, without padding. Types whose memory already has that shape expose
//! it through [`Encode::plain_bytes`], which lets the codec skip copying.

use zerocopy::IntoBytes;

use super::error::{SysencError, SysencResult};
use super::layout::Layout;

pub trait Encode {
    fn layout(&self) -> Layout;

    /// Appends the packed encoding of `self` to `out`.
    fn encode_fields(&self, out: &mut Vec<u8>) -> SysencResult<()>;

    /// Overwrites `self` from the front of `input` and advances it.
    fn decode_fields(&mut self, input: &mut &[u8]) -> SysencResult<()>;

    /// The value's own memory, when it is known to be free of padding.
    fn plain_bytes(&self) -> Option<&[u8]> {
        None
    }

    fn plain_bytes_mut(&mut self) -> Option<&mut [u8]> {
        None
    }
}

/// Types that can be stored in arrays, slices and vectors.
pub trait Element: Encode + Sized {
    fn element_layout() -> Layout;

    fn slice_plain(_items: &[Self]) -> Option<&[u8]> {
        None
    }

    fn slice_plain_mut(_items: &mut [Self]) -> Option<&mut [u8]> {
        None
    }
}

pub(crate) fn take<'a>(input: &mut &'a [u8], len: usize) -> SysencResult<&'a [u8]> {
    let Some((head, rest)) = input.split_at_checked(len) else {
        return Err(SysencError::LayoutMismatch {
            expected: len,
            actual: input.len(),
        });
    };
    *input = rest;
    Ok(head)
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn layout(&self) -> Layout {
                    Layout::scalar(size_of::<$ty>())
                }

                fn encode_fields(&self, out: &mut Vec<u8>) -> SysencResult<()> {
                    out.extend_from_slice(self.as_bytes());
                    Ok(())
                }

                fn decode_fields(&mut self, input: &mut &[u8]) -> SysencResult<()> {
                    let bytes = take(input, size_of::<$ty>())?;
                    self.as_mut_bytes().copy_from_slice(bytes);
                    Ok(())
                }

                fn plain_bytes(&self) -> Option<&[u8]> {
                    Some(self.as_bytes())
                }

                fn plain_bytes_mut(&mut self) -> Option<&mut [u8]> {
                    Some(self.as_mut_bytes())
                }
            }

            impl Element for $ty {
                fn element_layout() -> Layout {
                    Layout::scalar(size_of::<$ty>())
                }

                fn slice_plain(items: &[Self]) -> Option<&[u8]> {
                    Some(items.as_bytes())
                }

                fn slice_plain_mut(items: &mut [Self]) -> Option<&mut [u8]> {
                    Some(items.as_mut_bytes())
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

macro_rules! impl_pointer {
    ($($ptr:ty),*) => {
        $(
            impl<T> Encode for $ptr {
                fn layout(&self) -> Layout {
                    Layout::pointer()
                }

                fn encode_fields(&self, _out: &mut Vec<u8>) -> SysencResult<()> {
                    Err(SysencError::NotEncodable("pointer"))
                }

                fn decode_fields(&mut self, _input: &mut &[u8]) -> SysencResult<()> {
                    Err(SysencError::NotEncodable("pointer"))
                }
            }

            impl<T> Element for $ptr {
                fn element_layout() -> Layout {
                    Layout::pointer()
                }
            }
        )*
    };
}

impl_pointer!(*const T, *mut T);

impl<T: Element> Encode for [T] {
    fn layout(&self) -> Layout {
        Layout::array(T::element_layout(), self.len())
    }

    fn encode_fields(&self, out: &mut Vec<u8>) -> SysencResult<()> {
        self.iter().try_for_each(|item| item.encode_fields(out))
    }

    fn decode_fields(&mut self, input: &mut &[u8]) -> SysencResult<()> {
        self.iter_mut()
            .try_for_each(|item| item.decode_fields(input))
    }

    fn plain_bytes(&self) -> Option<&[u8]> {
        T::slice_plain(self)
    }

    fn plain_bytes_mut(&mut self) -> Option<&mut [u8]> {
        T::slice_plain_mut(self)
    }
}

impl<T: Element, const N: usize> Encode for [T; N] {
    fn layout(&self) -> Layout {
        Layout::array(T::element_layout(), N)
    }

    fn encode_fields(&self, out: &mut Vec<u8>) -> SysencResult<()> {
        self.as_slice().encode_fields(out)
    }

    fn decode_fields(&mut self, input: &mut &[u8]) -> SysencResult<()> {
        self.as_mut_slice().decode_fields(input)
    }

    fn plain_bytes(&self) -> Option<&[u8]> {
        T::slice_plain(self)
    }

    fn plain_bytes_mut(&mut self) -> Option<&mut [u8]> {
        T::slice_plain_mut(self)
    }
}

impl<T: Element, const N: usize> Element for [T; N] {
    fn element_layout() -> Layout {
        Layout::array(T::element_layout(), N)
    }

    fn slice_plain(items: &[Self]) -> Option<&[u8]> {
        T::slice_plain(items.as_flattened())
    }

    fn slice_plain_mut(items: &mut [Self]) -> Option<&mut [u8]> {
        T::slice_plain_mut(items.as_flattened_mut())
    }
}

/// Encodes the elements; the length is not part of the encoding.
impl<T: Element> Encode for Vec<T> {
    fn layout(&self) -> Layout {
        self.as_slice().layout()
    }

    fn encode_fields(&self, out: &mut Vec<u8>) -> SysencResult<()> {
        self.as_slice().encode_fields(out)
    }

    fn decode_fields(&mut self, input: &mut &[u8]) -> SysencResult<()> {
        self.as_mut_slice().decode_fields(input)
    }

    fn plain_bytes(&self) -> Option<&[u8]> {
        T::slice_plain(self)
    }

    fn plain_bytes_mut(&mut self) -> Option<&mut [u8]> {
        T::slice_plain_mut(self)
    }
}

/// `None` is nil and can't be encoded or decoded into.
impl<T: Encode> Encode for Option<T> {
    fn layout(&self) -> Layout {
        self.as_ref().map_or(Layout::nil(), Encode::layout)
    }

    fn encode_fields(&self, out: &mut Vec<u8>) -> SysencResult<()> {
        self.as_ref().ok_or(SysencError::Nil)?.encode_fields(out)
    }

    fn decode_fields(&mut self, input: &mut &[u8]) -> SysencResult<()> {
        self.as_mut().ok_or(SysencError::Nil)?.decode_fields(input)
    }

    fn plain_bytes(&self) -> Option<&[u8]> {
        self.as_ref()?.plain_bytes()
    }

    fn plain_bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.as_mut()?.plain_bytes_mut()
    }
}

/// Declares a `#[repr(C)]` struct and implements [`Encode`] and [`Element`] for it.
///
/// Fields without `pub` are private: they are still encoded field by field,
/// but keep the struct off the zero-copy path. Prefix the struct with `plain`
/// to also derive the `zerocopy` traits, which only compiles for structs
/// without padding and gives the zero-copy path access to the struct's memory.
/// Without `plain`, a struct is always copied, even when its layout has no
/// padding.
///
/// ```
/// kbtf::impl_encode! {
///     #[derive(Debug, Default)]
///     pub struct Pair {
///         pub key: u64,
///         pub value: u32,
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_encode {
    (
        plain
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($fvis:vis $field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            ::zerocopy::IntoBytes,
            ::zerocopy::FromBytes,
            ::zerocopy::Immutable,
            ::zerocopy::KnownLayout
        )]
        #[repr(C)]
        $vis struct $name {
            $($fvis $field: $ty),*
        }

        $crate::impl_encode!(@impl $name { $($fvis $field: $ty),* } {
            fn plain_bytes(&self) -> ::core::option::Option<&[u8]> {
                ::core::option::Option::Some(::zerocopy::IntoBytes::as_bytes(self))
            }

            fn plain_bytes_mut(&mut self) -> ::core::option::Option<&mut [u8]> {
                ::core::option::Option::Some(::zerocopy::IntoBytes::as_mut_bytes(self))
            }
        } {
            fn slice_plain(items: &[Self]) -> ::core::option::Option<&[u8]> {
                ::core::option::Option::Some(::zerocopy::IntoBytes::as_bytes(items))
            }

            fn slice_plain_mut(items: &mut [Self]) -> ::core::option::Option<&mut [u8]> {
                ::core::option::Option::Some(::zerocopy::IntoBytes::as_mut_bytes(items))
            }
        });
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($fvis:vis $field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        $vis struct $name {
            $($fvis $field: $ty),*
        }

        $crate::impl_encode!(@impl $name { $($fvis $field: $ty),* } {} {});
    };
    (
        @impl $name:ident { $($fvis:vis $field:ident : $ty:ty),* }
        { $($plain:tt)* } { $($slice:tt)* }
    ) => {
        impl $crate::sysenc::Encode for $name {
            fn layout(&self) -> $crate::sysenc::Layout {
                <Self as $crate::sysenc::Element>::element_layout()
            }

            fn encode_fields(
                &self,
                out: &mut ::std::vec::Vec<u8>,
            ) -> $crate::sysenc::SysencResult<()> {
                $($crate::sysenc::Encode::encode_fields(&self.$field, out)?;)*
                ::core::result::Result::Ok(())
            }

            fn decode_fields(&mut self, input: &mut &[u8]) -> $crate::sysenc::SysencResult<()> {
                $($crate::sysenc::Encode::decode_fields(&mut self.$field, input)?;)*
                ::core::result::Result::Ok(())
            }

            $($plain)*
        }

        impl $crate::sysenc::Element for $name {
            fn element_layout() -> $crate::sysenc::Layout {
                let layout = $crate::sysenc::Layout::structure(::core::mem::size_of::<Self>());
                $(
                    let offset = ::core::mem::offset_of!(Self, $field);
                    let field = <$ty as $crate::sysenc::Element>::element_layout();
                    let layout = if stringify!($fvis).is_empty() {
                        layout.private_field(offset, field)
                    } else {
                        layout.field(offset, field)
                    };
                )*
                layout.finish()
            }

            $($slice)*
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysenc::LayoutFlags;

    crate::impl_encode! {
        #[derive(Debug, Default, Clone, PartialEq)]
        struct Padded {
            pub a: u64,
            pub b: u32,
        }
    }

    crate::impl_encode! {
        plain
        #[derive(Debug, Default, Clone, PartialEq)]
        struct Packed {
            pub a: u16,
            pub b: u16,
            pub c: u32,
        }
    }

    crate::impl_encode! {
        #[derive(Debug, Default)]
        struct Hidden {
            a: u64,
        }
    }

    #[test]
    fn scalars_are_plain() {
        let value = 0x0102_0304u32;
        assert_eq!(value.layout(), Layout::scalar(4));
        assert_eq!(value.plain_bytes(), Some(&value.to_ne_bytes()[..]));
    }

    #[test]
    fn macro_layout_tracks_padding() {
        let padded = Padded::default();
        assert_eq!(padded.layout().size(), 16);
        assert_eq!(
            padded.layout().encoded(),
            12,
            "encoding drops trailing padding"
        );
        assert!(padded.layout().flags().contains(LayoutFlags::PADDING));
        assert!(
            padded.plain_bytes().is_none(),
            "padded structs expose no memory view"
        );

        let packed = Packed::default();
        assert!(packed.layout().is_plain());
        assert_eq!(packed.plain_bytes().map(<[u8]>::len), Some(8));
    }

    #[test]
    fn private_fields_are_flagged() {
        let hidden = Hidden::default();
        assert_eq!(hidden.layout().flags(), LayoutFlags::PRIVATE);
        let mut out = Vec::new();
        hidden.encode_fields(&mut out).unwrap();
        assert_eq!(out.len(), 8, "private fields are still encoded");
        let _ = hidden.a;
    }

    #[test]
    fn field_encoding_is_packed_native_order() {
        let value = Padded { a: 1, b: 2 };
        let mut out = Vec::new();
        value.encode_fields(&mut out).unwrap();
        let mut want = 1u64.to_ne_bytes().to_vec();
        want.extend_from_slice(&2u32.to_ne_bytes());
        assert_eq!(out, want);

        let mut back = Padded::default();
        let mut input = out.as_slice();
        back.decode_fields(&mut input).unwrap();
        assert_eq!(back, value);
        assert!(
            input.is_empty(),
            "decode consumes exactly the encoded bytes"
        );
    }

    #[test]
    fn arrays_of_arrays_flatten_to_one_view() {
        let grid = [[1u16, 2], [3, 4]];
        let bytes = grid.plain_bytes().unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[6..], &4u16.to_ne_bytes());
    }

    #[test]
    fn short_input_is_a_layout_mismatch() {
        let mut value = 0u64;
        let mut input: &[u8] = &[0; 4];
        let err = value.decode_fields(&mut input).unwrap_err();
        assert_eq!(
            err,
            SysencError::LayoutMismatch {
                expected: 8,
                actual: 4
            }
        );
    }

    #[test]
    fn none_is_nil() {
        let value: Option<u32> = None;
        assert!(value.layout().is_nil());
        assert_eq!(value.encode_fields(&mut Vec::new()), Err(SysencError::Nil));
        assert!(Some(7u32).layout().is_plain());
    }

    #[test]
    fn pointers_are_not_encodable() {
        let target = 5u64;
        let ptr: *const u64 = &target;
        assert!(ptr.layout().flags().contains(LayoutFlags::POINTER));
        assert_eq!(
            ptr.encode_fields(&mut Vec::new()),
            Err(SysencError::NotEncodable("pointer"))
        );
    }
}
