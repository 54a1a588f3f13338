//! Structural comparison of types that may live in different arenas.
//!
//! Two types are equal when their kinds, names and attributes match and their
//! children are pairwise equal. Pairs already under comparison are assumed
//! equal, which makes the check terminate on cyclic graphs.

use ahash::AHashSet;

use super::arena::{StringId, TypeArena, TypeRef};
use super::types::Type;

pub fn structurally_equal(a: &TypeArena, ra: TypeRef, b: &TypeArena, rb: TypeRef) -> bool {
    let mut assumed = AHashSet::new();
    let mut pending = vec![(ra, rb)];
    while let Some((left, right)) = pending.pop() {
        if !assumed.insert((left, right)) {
            continue;
        }
        if !shallow_equal(a, a.get(left), b, b.get(right)) {
            return false;
        }
        let lhs = a.get(left).children();
        let rhs = b.get(right).children();
        if lhs.len() != rhs.len() {
            return false;
        }
        pending.extend(lhs.into_iter().zip(rhs));
    }
    true
}

fn shallow_equal(a: &TypeArena, left: &Type, b: &TypeArena, right: &Type) -> bool {
    let same = |x: Option<StringId>, y: Option<StringId>| a.name(x) == b.name(y);
    if !same(left.name(), right.name()) {
        return false;
    }
    match (left, right) {
        (Type::Void, Type::Void) => true,
        (Type::Int(l), Type::Int(r)) => l.size == r.size && l.encoding == r.encoding,
        (Type::Pointer(_), Type::Pointer(_)) => true,
        (Type::Array(l), Type::Array(r)) => l.nelems == r.nelems,
        (Type::Struct(l), Type::Struct(r)) | (Type::Union(l), Type::Union(r)) => {
            l.size == r.size
                && l.members.len() == r.members.len()
                && l.members.iter().zip(&r.members).all(|(lm, rm)| {
                    lm.offset_bits == rm.offset_bits
                        && lm.bitfield_size == rm.bitfield_size
                        && same(lm.name, rm.name)
                })
        }
        (Type::Enum(l), Type::Enum(r)) => {
            l.size == r.size
                && l.signed == r.signed
                && l.values.len() == r.values.len()
                && l.values
                    .iter()
                    .zip(&r.values)
                    .all(|(lv, rv)| lv.value == rv.value && same(lv.name, rv.name))
        }
        (Type::Fwd(l), Type::Fwd(r)) => l.kind == r.kind,
        (Type::Typedef(_), Type::Typedef(_)) => true,
        (Type::Volatile(_), Type::Volatile(_))
        | (Type::Const(_), Type::Const(_))
        | (Type::Restrict(_), Type::Restrict(_)) => true,
        (Type::Func(l), Type::Func(r)) => l.linkage == r.linkage,
        (Type::FuncProto(l), Type::FuncProto(r)) => {
            l.params.len() == r.params.len()
                && l.params
                    .iter()
                    .zip(&r.params)
                    .all(|(lp, rp)| same(lp.name, rp.name))
        }
        (Type::Var(l), Type::Var(r)) => l.linkage == r.linkage,
        (Type::Datasec(l), Type::Datasec(r)) => {
            l.size == r.size
                && l.vars.len() == r.vars.len()
                && l.vars
                    .iter()
                    .zip(&r.vars)
                    .all(|(lv, rv)| lv.offset == rv.offset && lv.size == rv.size)
        }
        (Type::Float(l), Type::Float(r)) => l.size == r.size,
        (Type::DeclTag(l), Type::DeclTag(r)) => l.index == r.index,
        (Type::TypeTag(_), Type::TypeTag(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btf::types::{Composite, Int, IntEncoding, Member, Pointer};

    fn linked_list(arena: &mut TypeArena, field: &str) -> TypeRef {
        let list = arena.reserve();
        let ptr = arena.push(Type::Pointer(Pointer::new(list)));
        let mut body = Composite::new(Some(arena.intern("list")), 8);
        let next = Member::new(Some(arena.intern(field)), ptr, 0);
        body.members.push(next);
        arena.define(list, Type::Struct(body));
        list
    }

    #[test]
    fn equal_cycles_compare_equal_across_arenas() {
        let mut a = TypeArena::new();
        let mut b = TypeArena::new();
        // pad b so refs differ between the arenas
        b.push(Type::Int(Int::new(None, 1, IntEncoding::empty())));
        let la = linked_list(&mut a, "next");
        let lb = linked_list(&mut b, "next");
        assert_ne!(la, lb, "refs differ between arenas");
        assert!(
            structurally_equal(&a, la, &b, lb),
            "same shape should compare equal"
        );
    }

    #[test]
    fn member_names_matter() {
        let mut a = TypeArena::new();
        let mut b = TypeArena::new();
        let la = linked_list(&mut a, "next");
        let lb = linked_list(&mut b, "prev");
        assert!(
            !structurally_equal(&a, la, &b, lb),
            "renamed member should differ"
        );
    }

    #[test]
    fn anonymous_and_empty_names_are_equivalent() {
        let mut a = TypeArena::new();
        let mut b = TypeArena::new();
        let empty = Some(b.intern(""));
        let ia = a.push(Type::Int(Int::new(None, 4, IntEncoding::SIGNED)));
        let ib = b.push(Type::Int(Int::new(empty, 4, IntEncoding::SIGNED)));
        assert!(structurally_equal(&a, ia, &b, ib));
    }

    #[test]
    fn different_kinds_differ() {
        let mut a = TypeArena::new();
        let ia = a.push(Type::Int(Int::new(None, 4, IntEncoding::SIGNED)));
        let pa = a.push(Type::Pointer(Pointer::new(TypeArena::VOID)));
        assert!(!structurally_equal(&a, ia, &a, pa));
    }
}
