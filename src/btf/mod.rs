//! BTF type graphs: construction, serialization into the kernel's wire format and loading back.

pub mod arena;
pub mod builder;
pub mod declare;
pub mod equiv;
pub mod error;
pub mod loader;
pub mod marshal;
pub mod strings;
pub mod types;
pub mod walker;
pub mod wire;

pub use arena::{StringId, TypeArena, TypeRef};
pub use builder::{Builder, TypeId};
pub use declare::{CompositeBuilder, DatasecBuilder, EnumBuilder, FuncProtoBuilder, TypeBuilder};
pub use equiv::structurally_equal;
pub use error::{BtfError, BtfResult, FormatError};
pub use loader::{TypeGraph, load, load_from_reader};
pub use marshal::{ENUM64_PLACEHOLDER, MarshalOptions};
pub use types::{
    Array, Composite, Datasec, DeclTag, Enum, EnumValue, Float, Func, FuncLinkage, FuncParam,
    FuncProto, Fwd, FwdKind, Int, IntEncoding, Member, Pointer, Qualifier, Type, TypeTag, Typedef,
    Var, VarLinkage, VarSecinfo,
};
pub use walker::{TypeWalker, visit_postorder};
pub use wire::Kind;
