//! Parses a BTF buffer back into a type graph.
//!
//! Loading runs in three passes so that records may reference IDs that only
//! appear later in the buffer: raw records are split out first, then one
//! arena slot is reserved per ID, and finally every record is converted and
//! stored in its slot.

use std::io::Read;

use ahash::AHashMap;

use super::arena::{StringId, TypeArena, TypeRef};
use super::builder::TypeId;
use super::error::{BtfError, BtfResult, FormatError};
use super::strings::StringTable;
use super::types::{
    Array, Composite, Datasec, DeclTag, Enum, EnumValue, Float, Func, FuncLinkage, FuncParam,
    FuncProto, Fwd, FwdKind, Int, IntEncoding, Member, Pointer, Qualifier, Type, TypeTag, Typedef,
    Var, VarLinkage, VarSecinfo,
};
use super::wire::{self, HEADER_LEN, Header, Info, Kind, RECORD_HEADER_LEN};
use crate::endianness::Endianness;

/// Types decoded from one buffer, addressable by their wire ID.
#[derive(Debug, Clone)]
pub struct TypeGraph {
    arena: TypeArena,
    /// `types[id]` is the type with that ID; `types[0]` is Void.
    types: Vec<TypeRef>,
    by_name: AHashMap<String, Vec<TypeId>>,
}

impl TypeGraph {
    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    pub fn types(&self) -> &[TypeRef] {
        &self.types
    }

    pub fn type_by_id(&self, id: TypeId) -> Option<TypeRef> {
        self.types.get(id.index()).copied()
    }

    /// The lowest-numbered type called `name`.
    pub fn type_by_name(&self, name: &str) -> Option<(TypeId, TypeRef)> {
        self.types_by_name(name).next()
    }

    /// Every type called `name`, in ID order.
    pub fn types_by_name<'g>(&'g self, name: &str) -> impl Iterator<Item = (TypeId, TypeRef)> + 'g {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(|id| (*id, self.types[id.index()]))
    }

    /// Number of IDs including Void.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

pub fn load(bytes: &[u8], order: Endianness) -> BtfResult<TypeGraph> {
    let header = Header::parse(bytes, order)?;
    let hdr_len = header.hdr_len as usize;
    let extension = section(bytes, "header", 0, header.hdr_len as u64)?;
    if extension[HEADER_LEN..].iter().any(|byte| *byte != 0) {
        return Err(FormatError::NonZeroHeaderExtension.into());
    }
    let body = &bytes[hdr_len..];
    let type_data = section(body, "type", header.type_off as u64, header.type_len as u64)?;
    let string_data = section(body, "string", header.str_off as u64, header.str_len as u64)?;
    let strings = StringTable::parse(string_data)?;

    let raw = read_records(type_data, order)?;
    let count = raw.len() as u32 + 1;

    let mut arena = TypeArena::new();
    let mut types = Vec::with_capacity(count as usize);
    types.push(TypeArena::VOID);
    types.extend(raw.iter().map(|_| arena.reserve()));

    let mut by_name: AHashMap<String, Vec<TypeId>> = AHashMap::new();
    for (index, record) in raw.iter().enumerate() {
        let id = index as u32 + 1;
        let mut inflater = Inflater {
            arena: &mut arena,
            strings,
            types: &types,
            order,
            id,
        };
        let ty = inflater.inflate(record)?;
        if let Some(name) = ty.name() {
            let name = arena.resolve(name);
            if !name.is_empty() && !matches!(ty, Type::DeclTag(_) | Type::TypeTag(_)) {
                by_name.entry(name.to_owned()).or_default().push(TypeId(id));
            }
        }
        log::trace!("load ID {id}: {:?}", ty.kind());
        arena.define(types[id as usize], ty);
    }

    log::debug!(
        "loaded {} types ({} type bytes, {} string bytes, {order:?})",
        raw.len(),
        type_data.len(),
        string_data.len()
    );
    Ok(TypeGraph {
        arena,
        types,
        by_name,
    })
}

/// Reads the whole of `reader` and loads it.
pub fn load_from_reader<R: Read>(mut reader: R, order: Endianness) -> BtfResult<TypeGraph> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|err| BtfError::io("read BTF", err))?;
    load(&bytes, order)
}

fn section<'a>(bytes: &'a [u8], name: &'static str, offset: u64, len: u64) -> BtfResult<&'a [u8]> {
    let end = offset + len;
    if end > bytes.len() as u64 {
        return Err(FormatError::SectionOutOfBounds {
            section: name,
            end,
            len: bytes.len(),
        }
        .into());
    }
    Ok(&bytes[offset as usize..end as usize])
}

struct RawRecord<'a> {
    offset: usize,
    name_off: u32,
    info: Info,
    kind: Kind,
    size_or_type: u32,
    data: &'a [u8],
}

fn read_records(mut data: &[u8], order: Endianness) -> BtfResult<Vec<RawRecord<'_>>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while !data.is_empty() {
        let id = records.len() as u32 + 1;
        let mut fields = Words::new(data, order, offset);
        let name_off = fields.next("type record")?;
        let info = Info::from_raw(fields.next("type record")?);
        let size_or_type = fields.next("type record")?;
        let kind = Kind::from_raw(info.kind_raw())
            .filter(|kind| *kind != Kind::Unknown)
            .ok_or(FormatError::UnknownKind {
                id,
                kind: info.kind_raw(),
            })?;
        let data_len = kind.data_len(info.vlen());
        let rest = &data[RECORD_HEADER_LEN..];
        if rest.len() < data_len {
            return Err(FormatError::Truncated {
                what: "type data",
                offset: offset + RECORD_HEADER_LEN,
                needed: data_len - rest.len(),
            }
            .into());
        }
        records.push(RawRecord {
            offset,
            name_off,
            info,
            kind,
            size_or_type,
            data: &rest[..data_len],
        });
        data = &rest[data_len..];
        offset += RECORD_HEADER_LEN + data_len;
    }
    Ok(records)
}

/// Sequential reader of 32-bit words.
struct Words<'a> {
    data: &'a [u8],
    order: Endianness,
    base: usize,
    pos: usize,
}

impl<'a> Words<'a> {
    fn new(data: &'a [u8], order: Endianness, base: usize) -> Self {
        Self {
            data,
            order,
            base,
            pos: 0,
        }
    }

    fn next(&mut self, what: &'static str) -> BtfResult<u32> {
        let Some(bytes) = self.data.get(self.pos..self.pos + 4) else {
            return Err(FormatError::Truncated {
                what,
                offset: self.base + self.pos,
                needed: self.pos + 4 - self.data.len(),
            }
            .into());
        };
        self.pos += 4;
        let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
        Ok(self.order.u32_from(word))
    }
}

struct Inflater<'l, 'a> {
    arena: &'l mut TypeArena,
    strings: StringTable<'a>,
    types: &'l [TypeRef],
    order: Endianness,
    id: u32,
}

impl Inflater<'_, '_> {
    fn name(&mut self, offset: u32) -> BtfResult<Option<StringId>> {
        let value = self.strings.lookup(offset)?;
        Ok(if value.is_empty() {
            None
        } else {
            Some(self.arena.intern(value))
        })
    }

    /// Tag values are never anonymous, so an empty value is interned as is.
    fn value(&mut self, offset: u32) -> BtfResult<StringId> {
        let value = self.strings.lookup(offset)?;
        Ok(self.arena.intern(value))
    }

    fn target(&self, target: u32) -> BtfResult<TypeRef> {
        self.types.get(target as usize).copied().ok_or_else(|| {
            FormatError::TypeIdOutOfRange {
                id: self.id,
                target,
                count: self.types.len() as u32,
            }
            .into()
        })
    }

    fn inflate(&mut self, raw: &RawRecord<'_>) -> BtfResult<Type> {
        let mut data = Words::new(raw.data, self.order, raw.offset + RECORD_HEADER_LEN);
        let vlen = raw.info.vlen() as usize;
        let ty = match raw.kind {
            Kind::Unknown => {
                return Err(FormatError::UnknownKind {
                    id: self.id,
                    kind: 0,
                }
                .into());
            }
            Kind::Int => {
                let (encoding, offset, _bits) = wire::split_int_data(data.next("int data")?);
                if offset != 0 {
                    return Err(FormatError::IntBitOffset {
                        id: self.id,
                        offset,
                    }
                    .into());
                }
                let name = self.name(raw.name_off)?;
                Type::Int(Int::new(
                    name,
                    raw.size_or_type,
                    IntEncoding::from_bits_truncate(encoding),
                ))
            }
            Kind::Pointer => Type::Pointer(Pointer::new(self.target(raw.size_or_type)?)),
            Kind::Array => {
                let element = self.target(data.next("array")?)?;
                let index = self.target(data.next("array")?)?;
                let nelems = data.next("array")?;
                Type::Array(Array {
                    element,
                    index,
                    nelems,
                })
            }
            Kind::Struct | Kind::Union => {
                let mut composite = Composite::new(self.name(raw.name_off)?, raw.size_or_type);
                let bitfields = raw.info.kind_flag();
                composite.members.reserve(vlen);
                for _ in 0..vlen {
                    let name = self.name(data.next("member")?)?;
                    let ty = self.target(data.next("member")?)?;
                    let offset = data.next("member")?;
                    let member = if bitfields {
                        let bits = (offset >> 24) as u8;
                        Member::new(name, ty, offset & 0x00ff_ffff).with_bitfield(bits)
                    } else {
                        Member::new(name, ty, offset)
                    };
                    composite.members.push(member);
                }
                if raw.kind == Kind::Union {
                    Type::Union(composite)
                } else {
                    Type::Struct(composite)
                }
            }
            Kind::Enum | Kind::Enum64 => {
                let signed = raw.info.kind_flag();
                let mut value = Enum::new(self.name(raw.name_off)?, raw.size_or_type, signed);
                value.values.reserve(vlen);
                for _ in 0..vlen {
                    let name = self.name(data.next("enumerator")?)?;
                    let lo = data.next("enumerator")?;
                    let raw_value = if raw.kind == Kind::Enum64 {
                        let hi = data.next("enumerator")?;
                        (u64::from(hi) << 32) | u64::from(lo)
                    } else if signed {
                        lo as i32 as i64 as u64
                    } else {
                        u64::from(lo)
                    };
                    value.values.push(EnumValue {
                        name,
                        value: raw_value,
                    });
                }
                Type::Enum(value)
            }
            Kind::Fwd => Type::Fwd(Fwd {
                name: self.name(raw.name_off)?,
                kind: if raw.info.kind_flag() {
                    FwdKind::Union
                } else {
                    FwdKind::Struct
                },
            }),
            Kind::Typedef => Type::Typedef(Typedef {
                name: self.name(raw.name_off)?,
                target: self.target(raw.size_or_type)?,
            }),
            Kind::Volatile => Type::Volatile(Qualifier {
                target: self.target(raw.size_or_type)?,
            }),
            Kind::Const => Type::Const(Qualifier {
                target: self.target(raw.size_or_type)?,
            }),
            Kind::Restrict => Type::Restrict(Qualifier {
                target: self.target(raw.size_or_type)?,
            }),
            Kind::Func => {
                let raw_linkage = raw.info.vlen();
                let Some(linkage) = FuncLinkage::from_raw(raw_linkage) else {
                    return Err(FormatError::UnknownLinkage {
                        id: self.id,
                        linkage: u32::from(raw_linkage),
                    }
                    .into());
                };
                Type::Func(Func {
                    name: self.name(raw.name_off)?,
                    proto: self.target(raw.size_or_type)?,
                    linkage,
                })
            }
            Kind::FuncProto => {
                let ret = self.target(raw.size_or_type)?;
                let mut params = Vec::with_capacity(vlen);
                for _ in 0..vlen {
                    let name = self.name(data.next("param")?)?;
                    let ty = self.target(data.next("param")?)?;
                    params.push(FuncParam { name, ty });
                }
                Type::FuncProto(FuncProto { ret, params })
            }
            Kind::Var => {
                let raw_linkage = data.next("var")?;
                let Some(linkage) = VarLinkage::from_raw(raw_linkage) else {
                    return Err(FormatError::UnknownLinkage {
                        id: self.id,
                        linkage: raw_linkage,
                    }
                    .into());
                };
                Type::Var(Var {
                    name: self.name(raw.name_off)?,
                    ty: self.target(raw.size_or_type)?,
                    linkage,
                })
            }
            Kind::Datasec => {
                let mut vars = Vec::with_capacity(vlen);
                for _ in 0..vlen {
                    let var = self.target(data.next("secinfo")?)?;
                    let offset = data.next("secinfo")?;
                    let size = data.next("secinfo")?;
                    vars.push(VarSecinfo { var, offset, size });
                }
                Type::Datasec(Datasec {
                    name: self.name(raw.name_off)?,
                    size: raw.size_or_type,
                    vars,
                })
            }
            Kind::Float => Type::Float(Float {
                name: self.name(raw.name_off)?,
                size: raw.size_or_type,
            }),
            Kind::DeclTag => Type::DeclTag(DeclTag {
                target: self.target(raw.size_or_type)?,
                value: self.value(raw.name_off)?,
                index: data.next("decl tag")? as i32,
            }),
            Kind::TypeTag => Type::TypeTag(TypeTag {
                target: self.target(raw.size_or_type)?,
                value: self.value(raw.name_off)?,
            }),
        };
        Ok(ty)
    }
}
