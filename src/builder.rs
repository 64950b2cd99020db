//! A slot-based builder for defined heap types.
//!
//! A [`TypeBuilder`] session reserves a fixed number of type slots up front. Each slot is an
//! opaque [`DefinedType`] handle that can be used as a heap type in reference types before its
//! body has been assigned, which is what makes mutually recursive definitions possible: members
//! of a recursion group may reference any slot up to the end of their group, including later
//! ones. [`TypeBuilder::build`] checks the session's declarations against the rules for
//! recursive and subtype declarations and finalizes every slot atomically.
use thiserror::Error;

use crate::types::comptype::{CompType, StorageType};
use crate::types::heaptype::{DefinedType, HeapType, Shareability};
use crate::types::reftype::{Nullability, RefType};
use crate::types::subtype::is_valid_subtype;
use crate::types::valtype::ValType;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("type slot {index} was never assigned a body")]
    MissingBody { index: usize },

    #[error("recursion group at {start} with size {size} does not fit in {len} slots")]
    GroupOutOfBounds { start: usize, size: usize, len: usize },

    #[error("recursion group at {start} overlaps an earlier group")]
    OverlappingGroups { start: usize },

    #[error("type slot {index} references slot {child} past the end of its recursion group")]
    ForwardReference { index: usize, child: usize },

    #[error("type slot {index} declares supertype slot {supertype}, which does not precede it")]
    SupertypeOrder { index: usize, supertype: usize },

    #[error("type slot {index} declares a supertype of a different kind")]
    SupertypeKindMismatch { index: usize },

    #[error("type slot {index} declares a supertype with different shareability")]
    SupertypeShareabilityMismatch { index: usize },

    #[error("type slot {index} declares a supertype that is not open to subtyping")]
    SupertypeNotOpen { index: usize },

    #[error("type slot {index} is not a structural subtype of its declared supertype")]
    InvalidSubtype { index: usize },
}

pub struct TypeBuilder {
    slots: Vec<DefinedType>,
    bodies: Vec<Option<CompType>>,
    supertypes: Vec<Option<DefinedType>>,
    groups: Vec<(usize, usize)>,
}

impl TypeBuilder {
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(DefinedType::new).collect(),
            bodies: vec![None; size],
            supertypes: vec![None; size],
            groups: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The handle for slot `index`, usable as a heap type before the slot's body exists.
    pub fn slot(&self, index: usize) -> DefinedType {
        self.slots[index].clone()
    }

    /// The body assigned to slot `index` so far, if any.
    pub fn comp_type(&self, index: usize) -> Option<&CompType> {
        self.bodies[index].as_ref()
    }

    /// Assigns the body of slot `index`. Reassignment replaces the previous body.
    pub fn set_comp_type(&mut self, index: usize, body: CompType) {
        self.bodies[index] = Some(body);
    }

    /// Declares the supertype of slot `index`. The supertype may be another slot of this session
    /// or a defined type from an earlier one.
    pub fn sub_type_of(&mut self, index: usize, supertype: DefinedType) {
        self.supertypes[index] = Some(supertype);
    }

    pub fn set_open(&mut self, index: usize, open: bool) {
        self.slots[index].def().open.set(open);
    }

    pub fn set_shared(&mut self, index: usize, share: Shareability) {
        self.slots[index].def().share.set(share);
    }

    /// Declares the slots `start..start + size` to be one recursion group. Slots not covered by
    /// any declared group become singleton groups.
    pub fn create_rec_group(&mut self, start: usize, size: usize) {
        self.groups.push((start, size));
    }

    /// A provisional reference type, usable as field or signature storage before the referenced
    /// slot is populated.
    pub fn temp_ref_type(&self, heap_type: HeapType, nullability: Nullability) -> ValType {
        ValType::Ref(RefType::new(heap_type, nullability))
    }

    /// Finalizes all slots, checking the declarations made during the session. On success the
    /// returned types are immutable and the handles handed out earlier resolve to them.
    pub fn build(mut self) -> Result<Vec<HeapType>, BuildError> {
        let len = self.slots.len();
        for (index, body) in self.bodies.iter().enumerate() {
            if body.is_none() {
                return Err(BuildError::MissingBody { index });
            }
        }

        let group_ends = self.check_rec_groups()?;

        // Child references to slots of this session may not cross the end of the referencing
        // slot's recursion group.
        for (index, body) in self.bodies.iter().enumerate() {
            let mut violation = None;
            for_each_child_heap_type(body.as_ref().expect("checked above"), &mut |child| {
                if let HeapType::Defined(def) = child {
                    if let Some(child_index) = self.internal_index(def) {
                        if child_index >= group_ends[index] && violation.is_none() {
                            violation = Some(child_index);
                        }
                    }
                }
            });
            if let Some(child) = violation {
                return Err(BuildError::ForwardReference { index, child });
            }
        }

        for (index, supertype) in self.supertypes.iter().enumerate() {
            if let Some(supertype) = supertype {
                if let Some(sup_index) = self.internal_index(supertype) {
                    if sup_index >= index {
                        return Err(BuildError::SupertypeOrder {
                            index,
                            supertype: sup_index,
                        });
                    }
                }
            }
        }

        // Finalize the slots so the declared subtypings can be checked through the ordinary
        // accessors. A failure past this point leaves the handles initialized but unusable,
        // which is fine: the session is consumed either way.
        for index in 0..len {
            let body = self.bodies[index].take().expect("checked above");
            self.slots[index]
                .def()
                .body
                .set(body)
                .expect("slots are finalized exactly once");
            if let Some(supertype) = self.supertypes[index].take() {
                self.slots[index]
                    .def()
                    .supertype
                    .set(supertype)
                    .expect("slots are finalized exactly once");
            }
        }

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(supertype) = slot.declared_supertype() else {
                continue;
            };
            if slot.kind() != supertype.kind() {
                return Err(BuildError::SupertypeKindMismatch { index });
            }
            if slot.shared() != supertype.shared() {
                return Err(BuildError::SupertypeShareabilityMismatch { index });
            }
            if !supertype.is_open() {
                return Err(BuildError::SupertypeNotOpen { index });
            }
            // Structural checks against supertypes from other sessions are skipped: their
            // children name that session's types, which never compare equal to this session's
            // rebuilt slots.
            if self.internal_index(supertype).is_some()
                && !is_valid_subtype(slot.comp_type(), supertype.comp_type())
            {
                return Err(BuildError::InvalidSubtype { index });
            }
        }

        Ok(self.slots.into_iter().map(HeapType::Defined).collect())
    }

    /// Validates the declared recursion groups, completes them to a full tiling of the slots and
    /// records each slot's group position. Returns the exclusive group end for every slot.
    fn check_rec_groups(&self) -> Result<Vec<usize>, BuildError> {
        let len = self.slots.len();
        let mut groups = self.groups.clone();
        groups.sort_unstable();

        let mut tiling = Vec::new();
        let mut next = 0;
        for &(start, size) in &groups {
            let end = start.checked_add(size);
            let Some(end) = end.filter(|&end| size > 0 && end <= len) else {
                return Err(BuildError::GroupOutOfBounds { start, size, len });
            };
            if start < next {
                return Err(BuildError::OverlappingGroups { start });
            }
            while next < start {
                tiling.push((next, 1));
                next += 1;
            }
            tiling.push((start, size));
            next = end;
        }
        while next < len {
            tiling.push((next, 1));
            next += 1;
        }

        let mut group_ends = vec![0; len];
        for &(start, size) in &tiling {
            for position in 0..size {
                group_ends[start + position] = start + size;
                self.slots[start + position]
                    .def()
                    .rec_group
                    .set((position, size));
            }
        }
        Ok(group_ends)
    }

    /// The slot index of `ty` if it is a slot of this session.
    fn internal_index(&self, ty: &DefinedType) -> Option<usize> {
        let index = ty.slot_index();
        (index < self.slots.len() && self.slots[index] == *ty).then_some(index)
    }
}

fn for_each_child_heap_type(body: &CompType, f: &mut impl FnMut(&HeapType)) {
    let mut visit = |val: &ValType| {
        if let ValType::Ref(ref_type) = val {
            f(&ref_type.heap_type);
        }
    };
    match body {
        CompType::Struct(fields) => {
            for field in fields {
                if let StorageType::Val(val) = &field.1 {
                    visit(val);
                }
            }
        }
        CompType::Array(element) => {
            if let StorageType::Val(val) = &element.1 {
                visit(val);
            }
        }
        CompType::Func(signature) => {
            for val in signature.parameters.iter().chain(&signature.results) {
                visit(val);
            }
        }
    }
}
