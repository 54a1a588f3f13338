//! Byte order selection for the BTF wire format and the fixed-width helpers the codec is built on.

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    #[inline(always)]
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }

    #[inline(always)]
    pub fn put_u16(self, out: &mut Vec<u8>, value: u16) {
        match self {
            Endianness::Little => out.extend_from_slice(&value.to_le_bytes()),
            Endianness::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    #[inline(always)]
    pub fn put_u32(self, out: &mut Vec<u8>, value: u32) {
        match self {
            Endianness::Little => out.extend_from_slice(&value.to_le_bytes()),
            Endianness::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    #[inline(always)]
    pub fn u16_from(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endianness::Little => u16::from_le_bytes(bytes),
            Endianness::Big => u16::from_be_bytes(bytes),
        }
    }

    #[inline(always)]
    pub fn u32_from(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Self::native()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_read_agree_for_both_orders() {
        // each order must decode what it encoded, and the two orders must disagree on layout
        for order in [Endianness::Little, Endianness::Big] {
            let mut out = Vec::new();
            order.put_u32(&mut out, 0xEB9F_0102);
            let bytes: [u8; 4] = out[..].try_into().unwrap();
            assert_eq!(
                order.u32_from(bytes),
                0xEB9F_0102,
                "round trip through {order:?}"
            );
        }
        let mut little = Vec::new();
        let mut big = Vec::new();
        Endianness::Little.put_u16(&mut little, 0xEB9F);
        Endianness::Big.put_u16(&mut big, 0xEB9F);
        assert_eq!(
            little,
            [0x9F, 0xEB],
            "little endian stores the low byte first"
        );
        assert_eq!(big, [0xEB, 0x9F], "big endian stores the high byte first");
    }

    #[test]
    fn default_is_native() {
        assert_eq!(
            Endianness::default(),
            Endianness::native(),
            "default order follows the host"
        );
    }
}
