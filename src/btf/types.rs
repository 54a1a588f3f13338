//! The closed set of type shapes a BTF graph can hold.

use bitflags::bitflags;
use smallvec::SmallVec;

use super::arena::{StringId, TypeRef};
use super::wire::Kind;

bitflags! {
    /// Int encoding bits as stored in the wire format.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct IntEncoding: u8 {
        const SIGNED = 0b001;
        const CHAR = 0b010;
        const BOOL = 0b100;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Int {
    pub name: Option<StringId>,
    pub size: u32,
    pub encoding: IntEncoding,
}

impl Int {
    pub fn new(name: Option<StringId>, size: u32, encoding: IntEncoding) -> Self {
        Self {
            name,
            size,
            encoding,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.encoding.contains(IntEncoding::SIGNED)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pointer {
    pub target: TypeRef,
}

impl Pointer {
    pub fn new(target: TypeRef) -> Self {
        Self { target }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Array {
    pub element: TypeRef,
    /// Type of the index; compilers emit an `int`-like type or Void here.
    pub index: TypeRef,
    pub nelems: u32,
}

/// A named field of a struct or union.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub name: Option<StringId>,
    pub ty: TypeRef,
    pub offset_bits: u32,
    /// Zero unless the member is a bitfield.
    pub bitfield_size: u8,
}

impl Member {
    pub fn new(name: Option<StringId>, ty: TypeRef, offset_bits: u32) -> Self {
        Self {
            name,
            ty,
            offset_bits,
            bitfield_size: 0,
        }
    }

    pub fn with_bitfield(mut self, bits: u8) -> Self {
        self.bitfield_size = bits;
        self
    }
}

/// Shared payload of [`Type::Struct`] and [`Type::Union`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Composite {
    pub name: Option<StringId>,
    pub size: u32,
    pub members: Vec<Member>,
}

impl Composite {
    pub fn new(name: Option<StringId>, size: u32) -> Self {
        Self {
            name,
            size,
            members: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumValue {
    pub name: Option<StringId>,
    pub value: u64,
}

/// An enumeration. Values are stored as raw 64-bit patterns; signed enums
/// hold the two's complement of negative values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enum {
    pub name: Option<StringId>,
    pub size: u32,
    pub signed: bool,
    pub values: Vec<EnumValue>,
}

impl Enum {
    pub fn new(name: Option<StringId>, size: u32, signed: bool) -> Self {
        Self {
            name,
            size,
            signed,
            values: Vec::new(),
        }
    }

    /// 8-byte enums need the Enum64 record on the wire.
    pub fn is_64bit(&self) -> bool {
        self.size == 8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FwdKind {
    Struct,
    Union,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fwd {
    pub name: Option<StringId>,
    pub kind: FwdKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Typedef {
    pub name: Option<StringId>,
    pub target: TypeRef,
}

/// Payload of the `volatile`, `const` and `restrict` modifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Qualifier {
    pub target: TypeRef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum FuncLinkage {
    Static = 0,
    Global = 1,
    Extern = 2,
}

impl FuncLinkage {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::Static),
            1 => Some(Self::Global),
            2 => Some(Self::Extern),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Func {
    pub name: Option<StringId>,
    /// Always a [`Type::FuncProto`].
    pub proto: TypeRef,
    pub linkage: FuncLinkage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncParam {
    pub name: Option<StringId>,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncProto {
    pub ret: TypeRef,
    pub params: Vec<FuncParam>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum VarLinkage {
    Static = 0,
    Global = 1,
    Extern = 2,
}

impl VarLinkage {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Static),
            1 => Some(Self::Global),
            2 => Some(Self::Extern),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Var {
    pub name: Option<StringId>,
    pub ty: TypeRef,
    pub linkage: VarLinkage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarSecinfo {
    pub var: TypeRef,
    pub offset: u32,
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datasec {
    pub name: Option<StringId>,
    pub size: u32,
    pub vars: Vec<VarSecinfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Float {
    pub name: Option<StringId>,
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclTag {
    pub target: TypeRef,
    pub value: StringId,
    /// Member or parameter the tag applies to, -1 for the whole type.
    pub index: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeTag {
    pub target: TypeRef,
    pub value: StringId,
}

/// All supported type shapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Void,
    Int(Int),
    Pointer(Pointer),
    Array(Array),
    Struct(Composite),
    Union(Composite),
    Enum(Enum),
    Fwd(Fwd),
    Typedef(Typedef),
    Volatile(Qualifier),
    Const(Qualifier),
    Restrict(Qualifier),
    Func(Func),
    FuncProto(FuncProto),
    Var(Var),
    Datasec(Datasec),
    Float(Float),
    DeclTag(DeclTag),
    TypeTag(TypeTag),
}

impl Type {
    /// Wire kind this type is emitted as, absent any compatibility rewriting.
    pub fn kind(&self) -> Kind {
        match self {
            Type::Void => Kind::Unknown,
            Type::Int(_) => Kind::Int,
            Type::Pointer(_) => Kind::Pointer,
            Type::Array(_) => Kind::Array,
            Type::Struct(_) => Kind::Struct,
            Type::Union(_) => Kind::Union,
            Type::Enum(value) if value.is_64bit() => Kind::Enum64,
            Type::Enum(_) => Kind::Enum,
            Type::Fwd(_) => Kind::Fwd,
            Type::Typedef(_) => Kind::Typedef,
            Type::Volatile(_) => Kind::Volatile,
            Type::Const(_) => Kind::Const,
            Type::Restrict(_) => Kind::Restrict,
            Type::Func(_) => Kind::Func,
            Type::FuncProto(_) => Kind::FuncProto,
            Type::Var(_) => Kind::Var,
            Type::Datasec(_) => Kind::Datasec,
            Type::Float(_) => Kind::Float,
            Type::DeclTag(_) => Kind::DeclTag,
            Type::TypeTag(_) => Kind::TypeTag,
        }
    }

    /// The name stored in the record's name slot. Tags carry their value there.
    pub fn name(&self) -> Option<StringId> {
        match self {
            Type::Void | Type::Pointer(_) | Type::Array(_) | Type::FuncProto(_) => None,
            Type::Volatile(_) | Type::Const(_) | Type::Restrict(_) => None,
            Type::Int(value) => value.name,
            Type::Struct(value) | Type::Union(value) => value.name,
            Type::Enum(value) => value.name,
            Type::Fwd(value) => value.name,
            Type::Typedef(value) => value.name,
            Type::Func(value) => value.name,
            Type::Var(value) => value.name,
            Type::Datasec(value) => value.name,
            Type::Float(value) => value.name,
            Type::DeclTag(value) => Some(value.value),
            Type::TypeTag(value) => Some(value.value),
        }
    }

    /// Owned edges in the order the wire format stores them.
    pub fn children(&self) -> SmallVec<[TypeRef; 4]> {
        let mut out = SmallVec::new();
        match self {
            Type::Void | Type::Int(_) | Type::Enum(_) | Type::Fwd(_) | Type::Float(_) => {}
            Type::Pointer(value) => out.push(value.target),
            Type::Array(value) => {
                out.push(value.index);
                out.push(value.element);
            }
            Type::Struct(value) | Type::Union(value) => {
                out.extend(value.members.iter().map(|member| member.ty));
            }
            Type::Typedef(value) => out.push(value.target),
            Type::Volatile(value) | Type::Const(value) | Type::Restrict(value) => {
                out.push(value.target)
            }
            Type::Func(value) => out.push(value.proto),
            Type::FuncProto(value) => {
                out.push(value.ret);
                out.extend(value.params.iter().map(|param| param.ty));
            }
            Type::Var(value) => out.push(value.ty),
            Type::Datasec(value) => out.extend(value.vars.iter().map(|var| var.var)),
            Type::DeclTag(value) => out.push(value.target),
            Type::TypeTag(value) => out.push(value.target),
        }
        out
    }

    pub fn as_int(&self) -> Option<&Int> {
        match self {
            Type::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Type::Struct(value) | Type::Union(value) => Some(value),
            _ => None,
        }
    }
}
