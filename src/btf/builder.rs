//! Assigns wire IDs to the types of a graph ahead of marshaling.
//!
//! A [`Builder`] is single-writer: `add` takes `&mut self`. Marshaling only
//! needs `&self`, so any number of marshals may run against one builder while
//! no `add` is in progress.

use std::fmt;

use ahash::AHashMap;

use super::arena::{TypeArena, TypeRef};
use super::error::{BtfError, BtfResult};
use super::marshal::{Encoder, MarshalOptions};

/// Identifier of a type within one builder or serialized buffer. 0 is Void.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const VOID: TypeId = TypeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn next(self) -> BtfResult<TypeId> {
        self.0
            .checked_add(1)
            .map(TypeId)
            .ok_or(BtfError::IdOverflow)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deduplicating accumulator of root types.
///
/// Deduplication is by identity: pushing the same [`TypeRef`] twice yields one
/// ID, while two separately pushed but identical descriptions get two IDs.
/// Children that were never added explicitly are numbered at marshal time,
/// after every root, in postorder.
#[derive(Clone, Debug)]
pub struct Builder<'arena> {
    arena: &'arena TypeArena,
    types: Vec<TypeRef>,
    ids: AHashMap<TypeRef, TypeId>,
}

impl<'arena> Builder<'arena> {
    pub fn new(arena: &'arena TypeArena) -> Self {
        Self {
            arena,
            types: Vec::new(),
            ids: AHashMap::new(),
        }
    }

    /// Creates a builder whose IDs equal the positions in `types`.
    ///
    /// `types[0]` must be Void, and no type may appear twice.
    pub fn from_types(arena: &'arena TypeArena, types: &[TypeRef]) -> BtfResult<Self> {
        let mut builder = Self::new(arena);
        let Some((first, rest)) = types.split_first() else {
            return Ok(builder);
        };
        if !arena.is_void(*first) {
            return Err(BtfError::Construction(format!(
                "first type is {:?}, not Void",
                arena.get(*first).kind()
            )));
        }
        builder.types.reserve(rest.len());
        for (position, ty) in rest.iter().enumerate() {
            let want = TypeId(position as u32 + 1);
            let have = builder.add(*ty)?;
            if have != want {
                return Err(BtfError::Construction(format!(
                    "type at position {want} already has ID {have}"
                )));
            }
        }
        Ok(builder)
    }

    /// Returns the ID of `ty`, assigning the next free one on first sight.
    pub fn add(&mut self, ty: TypeRef) -> BtfResult<TypeId> {
        if self.arena.is_void(ty) {
            return Ok(TypeId::VOID);
        }
        if let Some(id) = self.ids.get(&ty) {
            return Ok(*id);
        }
        let id = TypeId(self.types.len() as u32).next()?;
        self.types.push(ty);
        self.ids.insert(ty, id);
        log::trace!("builder: {ty:?} -> ID {id}");
        Ok(id)
    }

    pub fn id_of(&self, ty: TypeRef) -> Option<TypeId> {
        if self.arena.is_void(ty) {
            return Some(TypeId::VOID);
        }
        self.ids.get(&ty).copied()
    }

    /// Roots in ID order; `types()[n]` has ID `n + 1`.
    pub fn types(&self) -> &[TypeRef] {
        &self.types
    }

    pub fn arena(&self) -> &'arena TypeArena {
        self.arena
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub(crate) fn ids(&self) -> &AHashMap<TypeRef, TypeId> {
        &self.ids
    }

    /// Serializes the builder's types into a fresh buffer.
    ///
    /// Buffers with 65536 or more types trip a bug in older kernels' BTF
    /// loaders; they are still produced, with a warning logged.
    pub fn marshal(&self, options: &MarshalOptions) -> BtfResult<Vec<u8>> {
        self.marshal_into(Vec::new(), options)
    }

    /// Like [`Builder::marshal`], reusing the allocation of `buf`.
    pub fn marshal_into(&self, buf: Vec<u8>, options: &MarshalOptions) -> BtfResult<Vec<u8>> {
        Encoder::new(self, options, buf).finish()
    }
}

impl PartialEq for Builder<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.arena, other.arena) && self.types == other.types && self.ids == other.ids
    }
}

impl Eq for Builder<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btf::declare::TypeBuilder;
    use crate::btf::types::IntEncoding;

    #[test]
    fn add_assigns_ids_in_first_add_order() {
        let mut arena = TypeArena::new();
        let mut tb = TypeBuilder::new(&mut arena);
        let int = tb.int("foo", 2, IntEncoding::SIGNED | IntEncoding::CHAR);
        let ptr = tb.pointer(int);
        let alias = tb.typedef("baz", int);

        let mut builder = Builder::new(&arena);
        assert_eq!(
            builder.add(ptr).unwrap(),
            TypeId(1),
            "first non-void type gets ID 1"
        );
        assert_eq!(
            builder.add(ptr).unwrap(),
            TypeId(1),
            "re-adding returns the same ID"
        );
        assert_eq!(
            builder.add(int).unwrap(),
            TypeId(2),
            "second type gets ID 2"
        );
        assert_eq!(
            builder.add(int).unwrap(),
            TypeId(2),
            "adding a type twice is idempotent"
        );
        assert_eq!(builder.add(alias).unwrap(), TypeId(3));
        assert_eq!(builder.types(), &[ptr, int, alias]);
    }

    #[test]
    fn void_is_always_zero() {
        let arena = TypeArena::new();
        let mut builder = Builder::new(&arena);
        assert_eq!(builder.add(TypeArena::VOID).unwrap(), TypeId::VOID);
        assert!(builder.is_empty(), "void is implicit and never stored");
        assert_eq!(builder.id_of(TypeArena::VOID), Some(TypeId::VOID));
    }

    #[test]
    fn identical_descriptions_are_distinct_types() {
        // dedup is by identity, not by structure
        let mut arena = TypeArena::new();
        let mut tb = TypeBuilder::new(&mut arena);
        let a = tb.int("int", 4, IntEncoding::SIGNED);
        let b = tb.int("int", 4, IntEncoding::SIGNED);
        let mut builder = Builder::new(&arena);
        assert_eq!(builder.add(a).unwrap(), TypeId(1));
        assert_eq!(builder.add(b).unwrap(), TypeId(2));
    }

    #[test]
    fn from_types_numbers_by_position() {
        let mut arena = TypeArena::new();
        let mut tb = TypeBuilder::new(&mut arena);
        let int = tb.int("int", 4, IntEncoding::SIGNED);
        let ptr = tb.pointer(int);
        let builder = Builder::from_types(&arena, &[TypeArena::VOID, int, ptr]).unwrap();
        assert_eq!(builder.id_of(int), Some(TypeId(1)));
        assert_eq!(builder.id_of(ptr), Some(TypeId(2)));
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn from_types_requires_leading_void() {
        let mut arena = TypeArena::new();
        let int = TypeBuilder::new(&mut arena).int("int", 4, IntEncoding::SIGNED);
        let err = Builder::from_types(&arena, &[int]).unwrap_err();
        assert!(matches!(err, BtfError::Construction(_)), "got {err}");
    }

    #[test]
    fn from_types_rejects_repeated_identity() {
        let mut arena = TypeArena::new();
        let int = TypeBuilder::new(&mut arena).int("int", 4, IntEncoding::SIGNED);
        let err = Builder::from_types(&arena, &[TypeArena::VOID, int, int]).unwrap_err();
        assert!(matches!(err, BtfError::Construction(_)), "got {err}");
        let types = [TypeArena::VOID, int, TypeArena::VOID];
        let err = Builder::from_types(&arena, &types).unwrap_err();
        assert!(
            matches!(err, BtfError::Construction(_)),
            "a second void is inconsistent"
        );
    }

    #[test]
    fn from_types_accepts_empty_input() {
        let arena = TypeArena::new();
        assert!(Builder::from_types(&arena, &[]).unwrap().is_empty());
    }
}
