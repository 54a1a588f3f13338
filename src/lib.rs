//! Kernel type information: a BTF type graph, its wire-format marshaler and
//! loader, and the fixed-layout codec used for system call arguments.

pub mod btf;
pub mod endianness;
pub mod features;
pub mod sysenc;

pub use btf::{BtfError, BtfResult, Builder, MarshalOptions, TypeArena, TypeGraph, TypeId, TypeRef};
pub use endianness::Endianness;
pub use features::{FeatureProbe, KernelVersion};
