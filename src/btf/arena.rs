//! Owns every type node of one graph plus the interned names they refer to.

use std::num::NonZeroU32;

use ahash::AHashMap;

use super::types::Type;

/// Handle to a type node stored in a [`TypeArena`].
///
/// Identity of a handle is what the [`Builder`](super::Builder) deduplicates on:
/// two structurally identical nodes pushed separately are distinct types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(NonZeroU32);

impl TypeRef {
    pub fn from_index(index: usize) -> Self {
        let raw = NonZeroU32::new((index as u32) + 1).expect("index overflow");
        Self(raw)
    }

    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StringId(NonZeroU32);

impl StringId {
    fn from_index(index: usize) -> Self {
        let raw = NonZeroU32::new((index as u32) + 1).expect("string index overflow");
        Self(raw)
    }

    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Default, Debug, Clone)]
struct StringPool {
    values: Vec<String>,
    lookup: AHashMap<String, StringId>,
}

impl StringPool {
    fn intern<S: AsRef<str>>(&mut self, value: S) -> StringId {
        let value_ref = value.as_ref();
        if let Some(id) = self.lookup.get(value_ref) {
            return *id;
        }
        let owned = value_ref.to_owned();
        let id = StringId::from_index(self.values.len());
        self.values.push(owned.clone());
        self.lookup.insert(owned, id);
        id
    }

    fn resolve(&self, id: StringId) -> &str {
        &self.values[id.index()]
    }
}

/// Dense storage for a type graph. Index 0 always holds [`Type::Void`].
///
/// Edges between types are [`TypeRef`]s into the same arena, which is how
/// shared children and reference cycles are represented.
#[derive(Debug, Clone)]
pub struct TypeArena {
    types: Vec<Type>,
    strings: StringPool,
}

impl TypeArena {
    pub const VOID: TypeRef = TypeRef(NonZeroU32::MIN);

    pub fn new() -> Self {
        Self {
            types: vec![Type::Void],
            strings: StringPool::default(),
        }
    }

    pub fn push(&mut self, ty: Type) -> TypeRef {
        self.types.push(ty);
        TypeRef::from_index(self.types.len() - 1)
    }

    /// Allocates a slot to be filled in later with [`TypeArena::define`], so
    /// that a type can be referenced before it is fully described.
    pub fn reserve(&mut self) -> TypeRef {
        self.push(Type::Void)
    }

    pub fn define(&mut self, slot: TypeRef, ty: Type) {
        self.types[slot.index()] = ty;
    }

    pub fn get(&self, id: TypeRef) -> &Type {
        &self.types[id.index()]
    }

    pub fn get_mut(&mut self, id: TypeRef) -> &mut Type {
        &mut self.types[id.index()]
    }

    pub fn contains(&self, id: TypeRef) -> bool {
        id.index() < self.types.len()
    }

    pub fn is_void(&self, id: TypeRef) -> bool {
        matches!(self.get(id), Type::Void)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        // Void is always present.
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeRef, &Type)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, ty)| (TypeRef::from_index(index), ty))
    }

    pub fn intern<S: AsRef<str>>(&mut self, value: S) -> StringId {
        self.strings.intern(value)
    }

    pub fn resolve(&self, id: StringId) -> &str {
        self.strings.resolve(id)
    }

    /// Resolves an optional name, mapping anonymous to the empty string.
    pub fn name(&self, id: Option<StringId>) -> &str {
        id.map_or("", |value| self.resolve(value))
    }

    pub fn type_name(&self, id: TypeRef) -> &str {
        self.name(self.get(id).name())
    }
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    //! Arena bookkeeping and string interning.
    use super::*;
    use crate::btf::types::{Int, IntEncoding, Pointer};

    #[test]
    fn void_occupies_the_first_slot() {
        let arena = TypeArena::new();
        assert_eq!(
            TypeArena::VOID.index(),
            0,
            "void handle should address index zero"
        );
        assert!(
            arena.is_void(TypeArena::VOID),
            "fresh arena should seed void"
        );
        assert_eq!(arena.len(), 1, "only void is present initially");
    }

    #[test]
    fn pushing_types_returns_dense_refs() {
        // refs follow push order so arena walks stay cache friendly
        let mut arena = TypeArena::new();
        let name = Some(arena.intern("u32"));
        let int = arena.push(Type::Int(Int::new(name, 4, IntEncoding::empty())));
        let ptr = arena.push(Type::Pointer(Pointer::new(int)));
        assert_eq!(int.index(), 1, "first pushed type follows void");
        assert_eq!(ptr.index(), 2, "second pushed type is next");
        assert_eq!(
            arena.type_name(int),
            "u32",
            "name should resolve through the pool"
        );
        assert_eq!(arena.type_name(ptr), "", "pointers are anonymous");
    }

    #[test]
    fn reserved_slots_can_be_defined_later() {
        // reserving first is how self-referential graphs are built
        let mut arena = TypeArena::new();
        let slot = arena.reserve();
        let ptr = arena.push(Type::Pointer(Pointer::new(slot)));
        arena.define(slot, Type::Pointer(Pointer::new(ptr)));
        let Type::Pointer(inner) = arena.get(slot) else {
            panic!("expected pointer in reserved slot");
        };
        assert_eq!(
            inner.target, ptr,
            "defined slot should point at the later type"
        );
    }

    #[test]
    fn string_interning_reuses_existing_entries() {
        let mut arena = TypeArena::new();
        let first = arena.intern("task_struct");
        let second = arena.intern("task_struct");
        assert_eq!(
            first, second,
            "intern pool should deduplicate identical strings"
        );
        assert_eq!(
            arena.resolve(first),
            "task_struct",
            "resolved string should match input"
        );
    }
}
