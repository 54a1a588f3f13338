//! Serializes a [`Builder`] into the BTF wire format.

use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};

use super::arena::{StringId, TypeArena, TypeRef};
use super::builder::{Builder, TypeId};
use super::error::{BtfError, BtfResult};
use super::strings::StringTableBuilder;
use super::types::{Composite, Enum, FuncLinkage, FwdKind, Type};
use super::walker::TypeWalker;
use super::wire::{self, HEADER_LEN, Header, Info, Kind};
use crate::endianness::Endianness;
use crate::features::FeatureProbe;

/// Name of the Int synthesized when an Enum64 is rewritten as a union.
pub const ENUM64_PLACEHOLDER: &str = "enum64_placeholder";

/// Older kernels mis-handle buffers with this many types or more.
pub const KERNEL_TYPE_LIMIT: u32 = 1 << 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarshalOptions {
    pub order: Endianness,
    /// Emit every Func as static, for kernels without func linkage support.
    pub strip_func_linkage: bool,
    /// Emit 8-byte enums as unions of a placeholder Int, for kernels without Enum64.
    ///
    /// The rewrite is lossy: values are dropped and only the names survive as
    /// union members. It matches what libbpf does for the same kernels.
    pub replace_enum64: bool,
}

impl MarshalOptions {
    /// Options suitable for handing the output to the running kernel.
    ///
    /// Capabilities `features` reports as unsupported switch on the matching
    /// compatibility rewrite; any other detection failure is returned.
    pub fn kernel<F: FeatureProbe + ?Sized>(features: &F) -> BtfResult<Self> {
        let missing = |result: BtfResult<()>| match result {
            Ok(()) => Ok(false),
            Err(err) if err.is_unsupported() => Ok(true),
            Err(err) => Err(err),
        };
        Ok(Self {
            order: Endianness::native(),
            strip_func_linkage: missing(features.have_func_linkage())?,
            replace_enum64: missing(features.have_enum64())?,
        })
    }
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self {
            order: Endianness::native(),
            strip_func_linkage: false,
            replace_enum64: false,
        }
    }
}

enum Pending {
    Type(TypeRef),
    Placeholder { size: u32, signed: bool },
}

pub(crate) struct Encoder<'a> {
    arena: &'a TypeArena,
    options: MarshalOptions,
    buf: Vec<u8>,
    strings: StringTableBuilder,
    ids: AHashMap<TypeRef, TypeId>,
    visited: AHashSet<TypeRef>,
    pending: VecDeque<(TypeId, Pending)>,
    last_id: TypeId,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(builder: &Builder<'a>, options: &MarshalOptions, mut buf: Vec<u8>) -> Self {
        buf.clear();
        // The header is written last, once section sizes are known.
        buf.resize(HEADER_LEN, 0);
        // Roots keep the IDs add() returned for them.
        let pending = builder
            .types()
            .iter()
            .enumerate()
            .map(|(index, ty)| (TypeId(index as u32 + 1), Pending::Type(*ty)))
            .collect();
        Self {
            arena: builder.arena(),
            options: *options,
            buf,
            strings: StringTableBuilder::new(),
            ids: builder.ids().clone(),
            visited: AHashSet::new(),
            pending,
            last_id: TypeId(builder.len() as u32),
        }
    }

    pub(crate) fn finish(mut self) -> BtfResult<Vec<u8>> {
        while let Some((id, item)) = self.pending.pop_front() {
            match item {
                Pending::Type(ty) => {
                    self.allocate_ids(ty)?;
                    self.deflate(id, ty)?;
                }
                Pending::Placeholder { size, signed } => {
                    self.deflate_placeholder(id, size, signed)?
                }
            }
        }

        let type_len = self.buf.len() - HEADER_LEN;
        let str_len = self.strings.len();
        let section_len = |len: usize| {
            u32::try_from(len).map_err(|_| BtfError::Encode {
                id: self.last_id,
                reason: format!("section of {len} bytes exceeds the format's 4 GiB limit"),
            })
        };
        let header = Header::new(section_len(type_len)?, section_len(str_len)?);
        self.buf.extend_from_slice(self.strings.as_bytes());
        let header = header.to_bytes(self.options.order);
        self.buf[..HEADER_LEN].copy_from_slice(&header);

        if self.last_id.0 >= KERNEL_TYPE_LIMIT {
            log::warn!(
                "BTF contains {} types; kernels with IDs limited to 16 bits may reject it",
                self.last_id
            );
        }
        log::debug!(
            "marshaled {} types ({type_len} type bytes, {str_len} string bytes, {:?})",
            self.last_id,
            self.options.order
        );
        Ok(self.buf)
    }

    /// Numbers every not yet numbered type reachable from `root`, children first.
    fn allocate_ids(&mut self, root: TypeRef) -> BtfResult<()> {
        let visited = &self.visited;
        let order: Vec<TypeRef> = TypeWalker::new(self.arena)
            .postorder(root, |ty| visited.contains(&ty))
            .collect();
        for ty in order {
            self.visited.insert(ty);
            if self.ids.contains_key(&ty) {
                continue;
            }
            let id = self.allocate()?;
            self.ids.insert(ty, id);
            self.pending.push_back((id, Pending::Type(ty)));
        }
        Ok(())
    }

    fn allocate(&mut self) -> BtfResult<TypeId> {
        self.last_id = self.last_id.next()?;
        Ok(self.last_id)
    }

    fn id(&self, owner: TypeId, ty: TypeRef) -> BtfResult<TypeId> {
        if self.arena.is_void(ty) {
            return Ok(TypeId::VOID);
        }
        self.ids.get(&ty).copied().ok_or_else(|| BtfError::Encode {
            id: owner,
            reason: format!("reference to {ty:?} which has no ID"),
        })
    }

    fn name(&mut self, name: Option<StringId>) -> BtfResult<u32> {
        self.strings.add(self.arena.name(name))
    }

    fn word(&mut self, value: u32) {
        self.options.order.put_u32(&mut self.buf, value);
    }

    fn record(&mut self, name_off: u32, info: Info, size_or_type: u32) {
        self.word(name_off);
        self.word(info.raw());
        self.word(size_or_type);
    }

    fn deflate(&mut self, id: TypeId, ty: TypeRef) -> BtfResult<()> {
        let arena = self.arena;
        let value = arena.get(ty);
        log::trace!(
            "deflate ID {id}: {:?} {:?}",
            value.kind(),
            arena.name(value.name())
        );
        let name = self.name(value.name())?;
        match value {
            Type::Void => {
                return Err(BtfError::Encode {
                    id,
                    reason: "Void is implicit in the wire format".into(),
                });
            }
            Type::Int(int) => {
                if int.size > 16 {
                    return Err(BtfError::Encode {
                        id,
                        reason: format!("int of {} bytes exceeds 128 bits", int.size),
                    });
                }
                self.record(name, Info::new(Kind::Int, 0, false), int.size);
                let data = wire::int_data(int.encoding.bits(), 0, (int.size * 8) as u8);
                self.word(data);
            }
            Type::Pointer(ptr) => {
                let target = self.id(id, ptr.target)?;
                self.record(name, Info::new(Kind::Pointer, 0, false), target.0);
            }
            Type::Array(array) => {
                let element = self.id(id, array.element)?;
                let index = self.id(id, array.index)?;
                self.record(name, Info::new(Kind::Array, 0, false), 0);
                self.word(element.0);
                self.word(index.0);
                self.word(array.nelems);
            }
            Type::Struct(composite) => self.deflate_composite(id, Kind::Struct, name, composite)?,
            Type::Union(composite) => self.deflate_composite(id, Kind::Union, name, composite)?,
            Type::Enum(value) if value.is_64bit() && self.options.replace_enum64 => {
                self.deflate_enum64_as_union(id, name, value)?
            }
            Type::Enum(value) if value.is_64bit() => self.deflate_enum64(id, name, value)?,
            Type::Enum(value) => self.deflate_enum(id, name, value)?,
            Type::Fwd(fwd) => {
                let info = Info::new(Kind::Fwd, 0, fwd.kind == FwdKind::Union);
                self.record(name, info, 0);
            }
            Type::Typedef(typedef) => {
                let target = self.id(id, typedef.target)?;
                self.record(name, Info::new(Kind::Typedef, 0, false), target.0);
            }
            Type::Volatile(qualifier) => {
                let target = self.id(id, qualifier.target)?;
                self.record(name, Info::new(Kind::Volatile, 0, false), target.0);
            }
            Type::Const(qualifier) => {
                let target = self.id(id, qualifier.target)?;
                self.record(name, Info::new(Kind::Const, 0, false), target.0);
            }
            Type::Restrict(qualifier) => {
                let target = self.id(id, qualifier.target)?;
                self.record(name, Info::new(Kind::Restrict, 0, false), target.0);
            }
            Type::Func(func) => {
                let proto = self.id(id, func.proto)?;
                let linkage = if self.options.strip_func_linkage {
                    FuncLinkage::Static
                } else {
                    func.linkage
                };
                self.record(name, Info::new(Kind::Func, linkage as u16, false), proto.0);
            }
            Type::FuncProto(proto) => {
                let ret = self.id(id, proto.ret)?;
                let vlen = vlen(id, proto.params.len())?;
                self.record(name, Info::new(Kind::FuncProto, vlen, false), ret.0);
                for param in &proto.params {
                    let param_name = self.name(param.name)?;
                    let param_ty = self.id(id, param.ty)?;
                    self.word(param_name);
                    self.word(param_ty.0);
                }
            }
            Type::Var(var) => {
                let target = self.id(id, var.ty)?;
                self.record(name, Info::new(Kind::Var, 0, false), target.0);
                self.word(var.linkage as u32);
            }
            Type::Datasec(datasec) => {
                let vlen = vlen(id, datasec.vars.len())?;
                self.record(name, Info::new(Kind::Datasec, vlen, false), datasec.size);
                for var in &datasec.vars {
                    let var_id = self.id(id, var.var)?;
                    self.word(var_id.0);
                    self.word(var.offset);
                    self.word(var.size);
                }
            }
            Type::Float(float) => {
                self.record(name, Info::new(Kind::Float, 0, false), float.size);
            }
            Type::DeclTag(tag) => {
                let target = self.id(id, tag.target)?;
                self.record(name, Info::new(Kind::DeclTag, 0, false), target.0);
                self.word(tag.index as u32);
            }
            Type::TypeTag(tag) => {
                let target = self.id(id, tag.target)?;
                self.record(name, Info::new(Kind::TypeTag, 0, false), target.0);
            }
        }
        Ok(())
    }

    fn deflate_composite(
        &mut self,
        id: TypeId,
        kind: Kind,
        name: u32,
        composite: &Composite,
    ) -> BtfResult<()> {
        let vlen = vlen(id, composite.members.len())?;
        let bitfield = composite
            .members
            .iter()
            .any(|member| member.bitfield_size > 0);
        self.record(name, Info::new(kind, vlen, bitfield), composite.size);
        for member in &composite.members {
            let member_name = self.name(member.name)?;
            let member_ty = self.id(id, member.ty)?;
            let offset = if bitfield {
                if member.offset_bits > 0x00ff_ffff {
                    return Err(BtfError::Encode {
                        id,
                        reason: format!("bitfield offset {} exceeds 24 bits", member.offset_bits),
                    });
                }
                wire::bitfield_offset(member.bitfield_size, member.offset_bits)
            } else {
                member.offset_bits
            };
            self.word(member_name);
            self.word(member_ty.0);
            self.word(offset);
        }
        Ok(())
    }

    fn deflate_enum(&mut self, id: TypeId, name: u32, value: &Enum) -> BtfResult<()> {
        let vlen = vlen(id, value.values.len())?;
        self.record(name, Info::new(Kind::Enum, vlen, value.signed), value.size);
        for entry in &value.values {
            let raw = if value.signed {
                i32::try_from(entry.value as i64).map(|v| v as u32).ok()
            } else {
                u32::try_from(entry.value).ok()
            };
            let Some(raw) = raw else {
                return Err(BtfError::Encode {
                    id,
                    reason: format!(
                        "value {} of enumerator {:?} exceeds 32 bits",
                        entry.value,
                        self.arena.name(entry.name)
                    ),
                });
            };
            let entry_name = self.name(entry.name)?;
            self.word(entry_name);
            self.word(raw);
        }
        Ok(())
    }

    fn deflate_enum64(&mut self, id: TypeId, name: u32, value: &Enum) -> BtfResult<()> {
        let vlen = vlen(id, value.values.len())?;
        let info = Info::new(Kind::Enum64, vlen, value.signed);
        self.record(name, info, value.size);
        for entry in &value.values {
            let entry_name = self.name(entry.name)?;
            self.word(entry_name);
            self.word(entry.value as u32);
            self.word((entry.value >> 32) as u32);
        }
        Ok(())
    }

    /// Emits the enum as a union whose members all share one placeholder Int.
    fn deflate_enum64_as_union(&mut self, id: TypeId, name: u32, value: &Enum) -> BtfResult<()> {
        let placeholder = self.allocate()?;
        self.pending.push_back((
            placeholder,
            Pending::Placeholder {
                size: value.size,
                signed: value.signed,
            },
        ));
        let vlen = vlen(id, value.values.len())?;
        self.record(name, Info::new(Kind::Union, vlen, false), value.size);
        for entry in &value.values {
            let entry_name = self.name(entry.name)?;
            self.word(entry_name);
            self.word(placeholder.0);
            self.word(0);
        }
        Ok(())
    }

    fn deflate_placeholder(&mut self, id: TypeId, size: u32, signed: bool) -> BtfResult<()> {
        log::trace!("deflate ID {id}: enum64 placeholder of {size} bytes");
        let name = self.strings.add(ENUM64_PLACEHOLDER)?;
        let encoding = if signed { 1 } else { 0 };
        self.record(name, Info::new(Kind::Int, 0, false), size);
        self.word(wire::int_data(encoding, 0, (size * 8) as u8));
        Ok(())
    }
}

fn vlen(id: TypeId, len: usize) -> BtfResult<u16> {
    u16::try_from(len).map_err(|_| BtfError::Encode {
        id,
        reason: format!("{len} entries exceed the 16-bit vlen field"),
    })
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::btf::declare::TypeBuilder;
    use crate::btf::types::IntEncoding;
    use crate::features::KernelVersion;

    #[test]
    fn single_int_matches_reference_bytes() {
        let mut arena = TypeArena::new();
        let int = TypeBuilder::new(&mut arena).int("int", 4, IntEncoding::SIGNED);
        let mut builder = Builder::new(&arena);
        builder.add(int).unwrap();
        let options = MarshalOptions {
            order: Endianness::Little,
            ..Default::default()
        };
        let buf = builder.marshal(&options).unwrap();
        assert_eq!(
            buf,
            hex!(
                "9feb0100 18000000 00000000 10000000 10000000 05000000"
                "01000000 00000001 04000000 20000001"
                "00696e74 00"
            ),
            "header, one INT record and the string table"
        );
    }

    #[test]
    fn children_are_numbered_after_roots() {
        let mut arena = TypeArena::new();
        let mut tb = TypeBuilder::new(&mut arena);
        let int = tb.int("int", 4, IntEncoding::SIGNED);
        let ptr = tb.pointer(int);
        let mut builder = Builder::new(&arena);
        builder.add(ptr).unwrap();
        let buf = builder
            .marshal(&MarshalOptions {
                order: Endianness::Little,
                ..Default::default()
            })
            .unwrap();
        // pointer record at ID 1 references the int allocated as ID 2
        let record = &buf[HEADER_LEN..HEADER_LEN + 12];
        assert_eq!(record, hex!("00000000 00000002 02000000"));
    }

    #[test]
    fn big_endian_output_uses_big_endian_magic() {
        let arena = TypeArena::new();
        let builder = Builder::new(&arena);
        let buf = builder
            .marshal(&MarshalOptions {
                order: Endianness::Big,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(&buf[..2], &[0xEB, 0x9F]);
        assert_eq!(
            buf.len(),
            HEADER_LEN + 1,
            "empty builder has only the empty string"
        );
    }

    #[test]
    fn oversized_enum_values_are_rejected() {
        let mut arena = TypeArena::new();
        let value = TypeBuilder::new(&mut arena)
            .enumeration("small", 4, false)
            .value("BIG", u64::from(u32::MAX) + 1)
            .finish();
        let mut builder = Builder::new(&arena);
        builder.add(value).unwrap();
        let err = builder.marshal(&MarshalOptions::default()).unwrap_err();
        assert!(
            matches!(err, BtfError::Encode { id: TypeId(1), .. }),
            "got {err}"
        );
    }

    #[test]
    fn negative_values_fit_signed_enums() {
        let mut arena = TypeArena::new();
        let value = TypeBuilder::new(&mut arena)
            .enumeration("errno", 4, true)
            .signed_value("EPERM", -1)
            .finish();
        let mut builder = Builder::new(&arena);
        builder.add(value).unwrap();
        assert!(builder.marshal(&MarshalOptions::default()).is_ok());
    }

    #[test]
    fn strip_func_linkage_emits_static_funcs() {
        let mut arena = TypeArena::new();
        let mut tb = TypeBuilder::new(&mut arena);
        let proto = tb.func_proto(TypeArena::VOID).finish();
        let func = tb.func("main", proto, FuncLinkage::Global);
        let mut builder = Builder::new(&arena);
        builder.add(func).unwrap();
        let options = MarshalOptions {
            order: Endianness::Little,
            strip_func_linkage: true,
            replace_enum64: false,
        };
        let buf = builder.marshal(&options).unwrap();
        let info = &buf[HEADER_LEN + 4..HEADER_LEN + 8];
        assert_eq!(
            info,
            hex!("0000000c"),
            "vlen carries linkage and must be zero"
        );
    }

    #[test]
    fn marshal_into_reuses_and_resets_the_buffer() {
        let arena = TypeArena::new();
        let builder = Builder::new(&arena);
        let stale = vec![0xAAu8; 64];
        let buf = builder
            .marshal_into(stale, &MarshalOptions::default())
            .unwrap();
        assert_eq!(
            buf.len(),
            HEADER_LEN + 1,
            "previous contents must be discarded"
        );
    }

    struct FakeKernel {
        enum64: bool,
        linkage: bool,
    }

    impl FeatureProbe for FakeKernel {
        fn have_enum64(&self) -> BtfResult<()> {
            if self.enum64 {
                Ok(())
            } else {
                Err(BtfError::Unsupported {
                    feature: "BTF_KIND_ENUM64",
                    requires: KernelVersion::new(6, 0, 0),
                })
            }
        }

        fn have_func_linkage(&self) -> BtfResult<()> {
            if self.linkage {
                Ok(())
            } else {
                Err(BtfError::io("bpf syscall", std::io::Error::other("EPERM")))
            }
        }
    }

    #[test]
    fn kernel_preset_follows_detected_features() {
        let old = FakeKernel {
            enum64: false,
            linkage: true,
        };
        let options = MarshalOptions::kernel(&old).unwrap();
        assert!(options.replace_enum64, "missing enum64 enables the rewrite");
        assert!(!options.strip_func_linkage);
        assert_eq!(options.order, Endianness::native());

        let broken = FakeKernel {
            enum64: true,
            linkage: false,
        };
        let err = MarshalOptions::kernel(&broken).unwrap_err();
        assert!(
            !err.is_unsupported(),
            "detection failures other than missing support propagate"
        );
    }
}
