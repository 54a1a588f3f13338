//! Cycle-safe traversal of a type graph.

use ahash::AHashSet;
use smallvec::SmallVec;

use super::arena::{TypeArena, TypeRef};

pub struct TypeWalker<'arena> {
    arena: &'arena TypeArena,
}

impl<'arena> TypeWalker<'arena> {
    pub fn new(arena: &'arena TypeArena) -> Self {
        Self { arena }
    }

    /// Iterates `root` and everything reachable from it, children first.
    ///
    /// `skip` is consulted once per node before it is entered; returning `true`
    /// prunes the node together with everything only reachable through it.
    /// Void is never yielded.
    pub fn postorder<F>(&self, root: TypeRef, skip: F) -> Postorder<'arena, F>
    where
        F: FnMut(TypeRef) -> bool,
    {
        Postorder::new(self.arena, root, skip)
    }
}

struct Frame {
    ty: TypeRef,
    children: SmallVec<[TypeRef; 4]>,
    next: usize,
}

pub struct Postorder<'arena, F> {
    arena: &'arena TypeArena,
    skip: F,
    walked: AHashSet<TypeRef>,
    stack: Vec<Frame>,
}

impl<'arena, F> Postorder<'arena, F>
where
    F: FnMut(TypeRef) -> bool,
{
    fn new(arena: &'arena TypeArena, root: TypeRef, skip: F) -> Self {
        let mut walk = Self {
            arena,
            skip,
            walked: AHashSet::new(),
            stack: Vec::new(),
        };
        walk.enter(root);
        walk
    }

    fn enter(&mut self, ty: TypeRef) {
        if self.arena.is_void(ty) || self.walked.contains(&ty) || (self.skip)(ty) {
            return;
        }
        self.walked.insert(ty);
        self.stack.push(Frame {
            ty,
            children: self.arena.get(ty).children(),
            next: 0,
        });
    }
}

impl<F> Iterator for Postorder<'_, F>
where
    F: FnMut(TypeRef) -> bool,
{
    type Item = TypeRef;

    fn next(&mut self) -> Option<TypeRef> {
        loop {
            let frame = self.stack.last_mut()?;
            if frame.next < frame.children.len() {
                let child = frame.children[frame.next];
                frame.next += 1;
                self.enter(child);
                continue;
            }
            return self.stack.pop().map(|frame| frame.ty);
        }
    }
}

/// Postorder visit that records every visited type in `seen`, so repeated
/// calls over a forest of roots visit each shared subgraph once.
pub fn visit_postorder<V>(
    arena: &TypeArena,
    root: TypeRef,
    seen: &mut AHashSet<TypeRef>,
    mut visit: V,
) where
    V: FnMut(TypeRef),
{
    let order: Vec<TypeRef> = TypeWalker::new(arena)
        .postorder(root, |ty| seen.contains(&ty))
        .collect();
    for ty in order {
        seen.insert(ty);
        visit(ty);
    }
}
