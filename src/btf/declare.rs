//! Fluent construction helpers that push type descriptions into an arena.

use super::arena::{StringId, TypeArena, TypeRef};
use super::types::{
    Array, Composite, Datasec, DeclTag, Enum, EnumValue, Float, Func, FuncLinkage, FuncParam,
    FuncProto, Fwd, FwdKind, Int, IntEncoding, Member, Pointer, Qualifier, Type, TypeTag, Typedef,
    Var, VarLinkage, VarSecinfo,
};

pub struct TypeBuilder<'arena> {
    arena: &'arena mut TypeArena,
}

impl<'arena> TypeBuilder<'arena> {
    pub fn new(arena: &'arena mut TypeArena) -> Self {
        Self { arena }
    }

    pub fn intern<S: AsRef<str>>(&mut self, name: S) -> StringId {
        self.arena.intern(name)
    }

    fn name(&mut self, name: &str) -> Option<StringId> {
        if name.is_empty() {
            None
        } else {
            Some(self.intern(name))
        }
    }

    /// Slot for a type that must be referenced before it is described.
    pub fn reserve(&mut self) -> TypeRef {
        self.arena.reserve()
    }

    pub fn int(&mut self, name: &str, size: u32, encoding: IntEncoding) -> TypeRef {
        let name = self.name(name);
        self.arena.push(Type::Int(Int::new(name, size, encoding)))
    }

    pub fn float(&mut self, name: &str, size: u32) -> TypeRef {
        let name = self.name(name);
        self.arena.push(Type::Float(Float { name, size }))
    }

    pub fn pointer(&mut self, target: TypeRef) -> TypeRef {
        self.arena.push(Type::Pointer(Pointer::new(target)))
    }

    pub fn array(&mut self, element: TypeRef, index: TypeRef, nelems: u32) -> TypeRef {
        self.arena.push(Type::Array(Array {
            element,
            index,
            nelems,
        }))
    }

    pub fn typedef(&mut self, name: &str, target: TypeRef) -> TypeRef {
        let name = self.name(name);
        self.arena.push(Type::Typedef(Typedef { name, target }))
    }

    pub fn fwd(&mut self, name: &str, kind: FwdKind) -> TypeRef {
        let name = self.name(name);
        self.arena.push(Type::Fwd(Fwd { name, kind }))
    }

    pub fn volatile(&mut self, target: TypeRef) -> TypeRef {
        self.arena.push(Type::Volatile(Qualifier { target }))
    }

    pub fn constant(&mut self, target: TypeRef) -> TypeRef {
        self.arena.push(Type::Const(Qualifier { target }))
    }

    pub fn restrict(&mut self, target: TypeRef) -> TypeRef {
        self.arena.push(Type::Restrict(Qualifier { target }))
    }

    pub fn func(&mut self, name: &str, proto: TypeRef, linkage: FuncLinkage) -> TypeRef {
        let name = self.name(name);
        self.arena.push(Type::Func(Func {
            name,
            proto,
            linkage,
        }))
    }

    pub fn var(&mut self, name: &str, ty: TypeRef, linkage: VarLinkage) -> TypeRef {
        let name = self.name(name);
        self.arena.push(Type::Var(Var { name, ty, linkage }))
    }

    pub fn decl_tag(&mut self, target: TypeRef, value: &str, index: i32) -> TypeRef {
        let value = self.intern(value);
        self.arena.push(Type::DeclTag(DeclTag {
            target,
            value,
            index,
        }))
    }

    pub fn type_tag(&mut self, target: TypeRef, value: &str) -> TypeRef {
        let value = self.intern(value);
        self.arena.push(Type::TypeTag(TypeTag { target, value }))
    }

    pub fn structure(&mut self, name: &str, size: u32) -> CompositeBuilder<'_, 'arena> {
        CompositeBuilder::new(self, name, size, false)
    }

    pub fn union(&mut self, name: &str, size: u32) -> CompositeBuilder<'_, 'arena> {
        CompositeBuilder::new(self, name, size, true)
    }

    pub fn enumeration(&mut self, name: &str, size: u32, signed: bool) -> EnumBuilder<'_, 'arena> {
        let name = self.name(name);
        EnumBuilder {
            builder: self,
            ty: Enum::new(name, size, signed),
        }
    }

    pub fn func_proto(&mut self, ret: TypeRef) -> FuncProtoBuilder<'_, 'arena> {
        FuncProtoBuilder {
            builder: self,
            ty: FuncProto {
                ret,
                params: Vec::new(),
            },
        }
    }

    pub fn datasec(&mut self, name: &str, size: u32) -> DatasecBuilder<'_, 'arena> {
        let name = self.name(name);
        DatasecBuilder {
            builder: self,
            ty: Datasec {
                name,
                size,
                vars: Vec::new(),
            },
        }
    }
}

pub struct CompositeBuilder<'builder, 'arena> {
    builder: &'builder mut TypeBuilder<'arena>,
    ty: Composite,
    is_union: bool,
}

impl<'builder, 'arena> CompositeBuilder<'builder, 'arena> {
    fn new(
        builder: &'builder mut TypeBuilder<'arena>,
        name: &str,
        size: u32,
        is_union: bool,
    ) -> Self {
        let name = builder.name(name);
        Self {
            builder,
            ty: Composite::new(name, size),
            is_union,
        }
    }

    /// Adds a member `byte_offset` bytes into the composite.
    ///
    /// # Panics
    ///
    /// Panics if the offset in bits does not fit in 32 bits. Members past
    /// 512 MiB cannot be described by the wire format.
    pub fn member(mut self, name: &str, ty: TypeRef, byte_offset: u32) -> Self {
        let Some(offset_bits) = byte_offset.checked_mul(8) else {
            panic!("member {name:?} at byte offset {byte_offset} overflows a u32 bit offset");
        };
        let name = self.builder.name(name);
        self.ty.members.push(Member::new(name, ty, offset_bits));
        self
    }

    pub fn bitfield(mut self, name: &str, ty: TypeRef, offset_bits: u32, bits: u8) -> Self {
        let name = self.builder.name(name);
        self.ty
            .members
            .push(Member::new(name, ty, offset_bits).with_bitfield(bits));
        self
    }

    fn into_type(self) -> (Type, &'builder mut TypeBuilder<'arena>) {
        let ty = if self.is_union {
            Type::Union(self.ty)
        } else {
            Type::Struct(self.ty)
        };
        (ty, self.builder)
    }

    pub fn finish(self) -> TypeRef {
        let (ty, builder) = self.into_type();
        builder.arena.push(ty)
    }

    /// Fills a slot obtained from [`TypeBuilder::reserve`].
    pub fn finish_into(self, slot: TypeRef) -> TypeRef {
        let (ty, builder) = self.into_type();
        builder.arena.define(slot, ty);
        slot
    }
}

pub struct EnumBuilder<'builder, 'arena> {
    builder: &'builder mut TypeBuilder<'arena>,
    ty: Enum,
}

impl EnumBuilder<'_, '_> {
    pub fn value(mut self, name: &str, value: u64) -> Self {
        let name = self.builder.name(name);
        self.ty.values.push(EnumValue { name, value });
        self
    }

    /// Stores `value` sign-extended to 64 bits.
    pub fn signed_value(self, name: &str, value: i64) -> Self {
        self.value(name, value as u64)
    }

    pub fn finish(self) -> TypeRef {
        self.builder.arena.push(Type::Enum(self.ty))
    }
}

pub struct FuncProtoBuilder<'builder, 'arena> {
    builder: &'builder mut TypeBuilder<'arena>,
    ty: FuncProto,
}

impl FuncProtoBuilder<'_, '_> {
    pub fn param(mut self, name: &str, ty: TypeRef) -> Self {
        let name = self.builder.name(name);
        self.ty.params.push(FuncParam { name, ty });
        self
    }

    pub fn finish(self) -> TypeRef {
        self.builder.arena.push(Type::FuncProto(self.ty))
    }
}

pub struct DatasecBuilder<'builder, 'arena> {
    builder: &'builder mut TypeBuilder<'arena>,
    ty: Datasec,
}

impl DatasecBuilder<'_, '_> {
    pub fn var(mut self, var: TypeRef, offset: u32, size: u32) -> Self {
        self.ty.vars.push(VarSecinfo { var, offset, size });
        self
    }

    pub fn finish(self) -> TypeRef {
        self.builder.arena.push(Type::Datasec(self.ty))
    }
}
