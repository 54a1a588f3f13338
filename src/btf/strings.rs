//! The string section: NUL-terminated names addressed by byte offset.
//!
//! Offset 0 always holds the empty string, which is how anonymous types are
//! encoded.

use ahash::AHashMap;

use super::error::{BtfError, BtfResult, FormatError};

/// Deduplicating string table writer.
#[derive(Debug, Clone)]
pub struct StringTableBuilder {
    data: Vec<u8>,
    index: AHashMap<String, u32>,
}

impl StringTableBuilder {
    pub fn new() -> Self {
        let mut index = AHashMap::new();
        index.insert(String::new(), 0);
        Self {
            data: vec![0],
            index,
        }
    }

    /// Returns the offset of `value`, appending it on first use.
    pub fn add(&mut self, value: &str) -> BtfResult<u32> {
        if let Some(&offset) = self.index.get(value) {
            return Ok(offset);
        }
        if value.as_bytes().contains(&0) {
            return Err(BtfError::InvalidString(value.to_owned()));
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.index.insert(value.to_owned(), offset);
        Ok(offset)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for StringTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view over a validated string section.
#[derive(Debug, Clone, Copy)]
pub struct StringTable<'a> {
    data: &'a [u8],
}

impl<'a> StringTable<'a> {
    pub fn parse(data: &'a [u8]) -> BtfResult<Self> {
        match (data.first(), data.last()) {
            (None, _) => Err(FormatError::EmptyStringTable.into()),
            (Some(first), _) if *first != 0 => Err(FormatError::StringTableStart.into()),
            (_, Some(last)) if *last != 0 => Err(FormatError::StringTableUnterminated.into()),
            _ => Ok(Self { data }),
        }
    }

    pub fn lookup(&self, offset: u32) -> BtfResult<&'a str> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(FormatError::StringOffsetOutOfRange(offset).into());
        }
        let tail = &self.data[start..];
        // The table is NUL terminated, so a terminator always exists.
        let end = tail
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(tail.len());
        std::str::from_utf8(&tail[..end]).map_err(|_| FormatError::InvalidUtf8(offset).into())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_lives_at_offset_zero() {
        let mut table = StringTableBuilder::new();
        assert_eq!(table.add("").unwrap(), 0, "empty string is pre-seeded");
        assert_eq!(table.as_bytes(), &[0], "fresh table holds a single NUL");
    }

    #[test]
    fn add_deduplicates_by_content() {
        let mut table = StringTableBuilder::new();
        let foo = table.add("foo").unwrap();
        let bar = table.add("bar").unwrap();
        assert_eq!(foo, 1, "first string follows the leading NUL");
        assert_eq!(bar, 5, "second string follows foo and its terminator");
        assert_eq!(
            table.add("foo").unwrap(),
            foo,
            "repeated strings reuse their offset"
        );
        assert_eq!(table.as_bytes(), b"\0foo\0bar\0");
    }

    #[test]
    fn add_rejects_interior_nul() {
        let mut table = StringTableBuilder::new();
        assert!(matches!(table.add("a\0b"), Err(BtfError::InvalidString(_))));
    }

    #[test]
    fn lookup_resolves_offsets() {
        let table = StringTable::parse(b"\0foo\0bar\0").unwrap();
        assert_eq!(table.lookup(0).unwrap(), "");
        assert_eq!(table.lookup(5).unwrap(), "bar");
        assert_eq!(
            table.lookup(2).unwrap(),
            "oo",
            "offsets may point into a string's tail"
        );
        assert!(matches!(
            table.lookup(9),
            Err(BtfError::Format(FormatError::StringOffsetOutOfRange(9)))
        ));
    }

    #[test]
    fn parse_validates_framing() {
        assert!(matches!(
            StringTable::parse(b""),
            Err(BtfError::Format(FormatError::EmptyStringTable))
        ));
        assert!(matches!(
            StringTable::parse(b"a\0"),
            Err(BtfError::Format(FormatError::StringTableStart))
        ));
        assert!(matches!(
            StringTable::parse(b"\0a"),
            Err(BtfError::Format(FormatError::StringTableUnterminated))
        ));
    }
}
