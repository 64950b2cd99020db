//! Repair of uninhabitable heap types.
//!
//! There are two root causes of uninhabitability: a non-nullable reference to a bottom type has
//! no values at all, and a cycle of non-nullable references leaves no order in which the
//! participating types could ever be constructed one at a time. Types that merely reach an
//! uninhabitable type through non-nullable references become inhabitable as soon as the root
//! causes are fixed, so only the roots need repair.
//!
//! It suffices to make every non-nullable reference to a bottom type nullable and to break every
//! cycle of non-nullable references by making one reference in it nullable. To keep the declared
//! subtyping valid, a field made nullable must also be made nullable in the related types that
//! constrain it: in all supertypes that have the field when it is immutable (covariant), and in
//! all subtypes when it is mutable (invariant).
use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::builder::TypeBuilder;
use crate::types::comptype::{CompType, FieldType, Mut, StorageType};
use crate::types::functype::FuncType;
use crate::types::heaptype::{AbsHeapType, DefinedType, HeapType};
use crate::types::reftype::{Nullability, RefType};
use crate::types::valtype::ValType;

/// Uniquely identifies a reference within a type: struct fields and the array element (index 0)
/// count first; for signatures, parameters are followed by results.
type FieldPos = (HeapType, usize);

/// How a field's type may vary across subtyping, which determines the direction nullability
/// edits propagate in.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum Variance {
    Invariant,
    Covariant,
}

/// Returns `types` with every type replaced by an inhabitable equivalent. The output has the
/// same length, basic types are preserved in place, and declared subtyping remains valid.
///
/// The input types must come from finalized [`TypeBuilder`] sessions and each type's recursion
/// group must appear contiguously and in order, as `generate` produces them.
pub fn make_inhabitable(types: &[HeapType]) -> Vec<HeapType> {
    if types.is_empty() {
        return Vec::new();
    }

    // Remove duplicate and basic types. They are reinserted at the end.
    let mut type_indices: HashMap<HeapType, usize> = HashMap::new();
    let mut deduplicated: Vec<DefinedType> = Vec::new();
    let mut dedup_slots: Vec<Option<usize>> = Vec::with_capacity(types.len());
    for ty in types {
        match ty {
            HeapType::Abs(..) => dedup_slots.push(None),
            HeapType::Defined(def) => {
                let next = deduplicated.len();
                let slot = *type_indices.entry(ty.clone()).or_insert(next);
                if slot == next {
                    deduplicated.push(def.clone());
                }
                dedup_slots.push(Some(slot));
            }
        }
    }

    let mut inhabitator = Inhabitator::new(&deduplicated);
    inhabitator.mark_bottom_refs_nullable();
    inhabitator.mark_extern_refs_nullable();
    inhabitator.break_non_nullable_cycles();
    let rebuilt = inhabitator.build();

    dedup_slots
        .iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            None => types[index].clone(),
            Some(slot) => rebuilt[*slot].clone(),
        })
        .collect()
}

struct Inhabitator<'a> {
    /// The deduplicated input types.
    types: &'a [DefinedType],
    /// The references to make nullable, by position.
    nullables: HashSet<FieldPos>,
    /// Immediate declared subtypes among the input types. Keys may include supertypes from
    /// outside the input set.
    subtypes: HashMap<DefinedType, Vec<DefinedType>>,
}

impl<'a> Inhabitator<'a> {
    fn new(types: &'a [DefinedType]) -> Self {
        let mut subtypes: HashMap<DefinedType, Vec<DefinedType>> = HashMap::new();
        for ty in types {
            if let Some(supertype) = ty.declared_supertype() {
                subtypes
                    .entry(supertype.clone())
                    .or_default()
                    .push(ty.clone());
            }
        }
        Self {
            types,
            nullables: HashSet::new(),
            subtypes,
        }
    }

    fn variance(&self, ty: &DefinedType, index: usize) -> Variance {
        let mutability = match ty.comp_type() {
            CompType::Struct(fields) => fields[index].0,
            CompType::Array(element) => element.0,
            CompType::Func(_) => {
                unreachable!("signatures are exempt from nullability propagation")
            }
        };
        match mutability {
            Mut::Var => Variance::Invariant,
            Mut::Const => Variance::Covariant,
        }
    }

    /// Marks the reference at `(ty, index)` nullable, along with the positions in related types
    /// that subtyping forces to change with it. Marking a position that is already nullable or
    /// that a narrower relative lacks is harmless: such entries are ignored when rebuilding.
    fn mark_nullable(&mut self, ty: &DefinedType, index: usize) {
        self.nullables.insert((HeapType::Defined(ty.clone()), index));
        match self.variance(ty, index) {
            Variance::Covariant => {
                // Mark the position in all supertypes up the declared chain.
                let mut curr = ty.clone();
                while let Some(supertype) = curr.declared_supertype().cloned() {
                    self.nullables
                        .insert((HeapType::Defined(supertype.clone()), index));
                    curr = supertype;
                }
            }
            Variance::Invariant => {
                // Find the topmost type that still has this position, then mark it in that type
                // and all of its transitive subtypes.
                let mut curr = ty.clone();
                while let Some(supertype) = curr.declared_supertype().cloned() {
                    let wide_enough = match supertype.comp_type() {
                        CompType::Struct(fields) => fields.len() > index,
                        CompType::Array(_) => true,
                        CompType::Func(_) => false,
                    };
                    if !wide_enough {
                        break;
                    }
                    curr = supertype;
                }
                let mut stack = vec![curr];
                while let Some(ty) = stack.pop() {
                    self.nullables.insert((HeapType::Defined(ty.clone()), index));
                    if let Some(subs) = self.subtypes.get(&ty) {
                        stack.extend(subs.iter().cloned());
                    }
                }
            }
        }
    }

    /// Marks every non-nullable reference to a bottom type. Signatures are exempt: functions can
    /// be instantiated even when their types mention uninhabitable types.
    fn mark_bottom_refs_nullable(&mut self) {
        let types = self.types;
        for ty in types {
            for (index, ref_type) in non_signature_ref_children(ty) {
                if ref_type.nullability == Nullability::NonNullable && ref_type.heap_type.is_bottom()
                {
                    self.mark_nullable(ty, index);
                }
            }
        }
    }

    /// Marks every non-nullable externref. The enclosing fuzzer cannot synthesize non-null
    /// external references, so they are as good as uninhabitable.
    fn mark_extern_refs_nullable(&mut self) {
        let types = self.types;
        for ty in types {
            for (index, ref_type) in non_signature_ref_children(ty) {
                if ref_type.nullability == Nullability::NonNullable
                    && ref_type.heap_type.is_abs(AbsHeapType::Extern)
                {
                    self.mark_nullable(ty, index);
                }
            }
        }
    }

    /// Depth-first search over non-nullable reference edges, marking the closing reference of
    /// every cycle found.
    fn break_non_nullable_cycles(&mut self) {
        // Types whose reachable subgraph is fully explored; nothing they reach can cycle back
        // into the current path.
        let mut visited: HashSet<HeapType> = HashSet::new();

        // The path currently being explored, in order, with each entry's children and the
        // position to resume from. A child that is already on the path closes a cycle.
        let mut visiting: IndexMap<HeapType, Frame> = IndexMap::new();

        for root in self.types {
            let root = HeapType::Defined(root.clone());
            if visited.contains(&root) {
                continue;
            }
            debug_assert!(visiting.is_empty());
            visiting.insert(root.clone(), Frame::new(&root));

            while !visiting.is_empty() {
                let last = visiting.len() - 1;
                let step = loop {
                    let (curr, child) = {
                        let (curr, frame) = visiting.get_index(last).expect("last is in range");
                        match frame.children.get(frame.next) {
                            None => break Step::Pop,
                            Some(child) => (curr.clone(), child.clone()),
                        }
                    };
                    let (index, ref_type) = child;

                    // Nullable references cannot cause uninhabitable cycles, and neither can
                    // references already marked nullable for subtyping reasons. References to
                    // fully visited types cannot reach the current path, and references to
                    // signatures always break cycles because functions can be constructed
                    // regardless of their types.
                    let skip = ref_type.is_nullable()
                        || self.nullables.contains(&(curr.clone(), index))
                        || visited.contains(&ref_type.heap_type)
                        || ref_type.heap_type.is_signature();
                    if skip {
                        visiting.get_index_mut(last).expect("last is in range").1.next += 1;
                        continue;
                    }

                    if visiting.contains_key(&ref_type.heap_type) {
                        // This reference closes a cycle: break it here.
                        let HeapType::Defined(def) = &curr else {
                            unreachable!("cycles are closed from struct or array positions")
                        };
                        self.mark_nullable(def, index);
                        visiting.get_index_mut(last).expect("last is in range").1.next += 1;
                        continue;
                    }

                    visiting.get_index_mut(last).expect("last is in range").1.next += 1;
                    break Step::Recurse(ref_type.heap_type.clone());
                };

                match step {
                    Step::Pop => {
                        let (ty, _) = visiting.pop().expect("the path is non-empty");
                        visited.insert(ty);
                    }
                    Step::Recurse(ty) => {
                        let frame = Frame::new(&ty);
                        visiting.insert(ty, frame);
                    }
                }
            }
        }
    }

    /// Rebuilds the deduplicated types with the collected nullability edits applied.
    fn build(&self) -> Vec<HeapType> {
        let type_indices: HashMap<DefinedType, usize> = self
            .types
            .iter()
            .enumerate()
            .map(|(index, ty)| (ty.clone(), index))
            .collect();
        let mut builder = TypeBuilder::new(self.types.len());

        // Copy the bodies, aiming references at the corresponding new slot and making them
        // nullable where marked.
        for (index, ty) in self.types.iter().enumerate() {
            let body = match ty.comp_type() {
                CompType::Func(signature) => {
                    let mut position = 0;
                    let mut rewrite_seq = |vals: &[ValType]| -> Vec<ValType> {
                        vals.iter()
                            .map(|val| {
                                let val =
                                    self.rewrite(&builder, &type_indices, ty, position, val);
                                position += 1;
                                val
                            })
                            .collect()
                    };
                    let parameters = rewrite_seq(&signature.parameters);
                    let results = rewrite_seq(&signature.results);
                    CompType::Func(FuncType {
                        parameters,
                        results,
                    })
                }
                CompType::Struct(fields) => CompType::Struct(
                    fields
                        .iter()
                        .enumerate()
                        .map(|(position, field)| {
                            self.rewrite_field(&builder, &type_indices, ty, position, field)
                        })
                        .collect(),
                ),
                CompType::Array(element) => {
                    CompType::Array(self.rewrite_field(&builder, &type_indices, ty, 0, element))
                }
            };
            builder.set_comp_type(index, body);
        }

        // Re-establish the recursion groups of the originals.
        let mut start = 0;
        while start < self.types.len() {
            let size = self.types[start]
                .rec_group_size()
                .min(self.types.len() - start);
            builder.create_rec_group(start, size);
            start += size;
        }

        // Re-establish supertypes, openness and shareability. Supertypes within the input set
        // are re-aimed at the corresponding new slot.
        for (index, ty) in self.types.iter().enumerate() {
            if let Some(supertype) = ty.declared_supertype() {
                let target = match type_indices.get(supertype) {
                    Some(&slot) => builder.slot(slot),
                    None => supertype.clone(),
                };
                builder.sub_type_of(index, target);
            }
            builder.set_open(index, ty.is_open());
            builder.set_shared(index, ty.shared());
        }

        builder
            .build()
            .expect("internal error: repaired collection failed to finalize")
    }

    fn rewrite(
        &self,
        builder: &TypeBuilder,
        type_indices: &HashMap<DefinedType, usize>,
        ty: &DefinedType,
        position: usize,
        val: &ValType,
    ) -> ValType {
        let ValType::Ref(ref_type) = val else {
            return val.clone();
        };
        let heap_type = match &ref_type.heap_type {
            HeapType::Defined(def) => match type_indices.get(def) {
                Some(&slot) => HeapType::Defined(builder.slot(slot)),
                None => ref_type.heap_type.clone(),
            },
            abs => abs.clone(),
        };
        let nullability = if self
            .nullables
            .contains(&(HeapType::Defined(ty.clone()), position))
        {
            Nullability::Nullable
        } else {
            ref_type.nullability
        };
        ValType::Ref(RefType {
            heap_type,
            nullability,
            exactness: ref_type.exactness,
        })
    }

    fn rewrite_field(
        &self,
        builder: &TypeBuilder,
        type_indices: &HashMap<DefinedType, usize>,
        ty: &DefinedType,
        position: usize,
        field: &FieldType,
    ) -> FieldType {
        match &field.1 {
            StorageType::Pack(pack) => FieldType(field.0, StorageType::Pack(*pack)),
            StorageType::Val(val) => FieldType(
                field.0,
                StorageType::Val(self.rewrite(builder, type_indices, ty, position, val)),
            ),
        }
    }
}

enum Step {
    Recurse(HeapType),
    Pop,
}

struct Frame {
    /// The reference children of the frame's type, with their field positions.
    children: Vec<(usize, RefType)>,
    /// The next child to explore.
    next: usize,
}

impl Frame {
    fn new(ty: &HeapType) -> Self {
        Self {
            children: ref_children(ty),
            next: 0,
        }
    }
}

/// The reference children of a heap type, paired with their field positions. Abstract types have
/// none.
fn ref_children(ty: &HeapType) -> Vec<(usize, RefType)> {
    let HeapType::Defined(def) = ty else {
        return Vec::new();
    };
    match def.comp_type() {
        CompType::Struct(fields) => fields
            .iter()
            .enumerate()
            .filter_map(|(index, field)| Some((index, storage_ref(field)?.clone())))
            .collect(),
        CompType::Array(element) => storage_ref(element)
            .map(|ref_type| (0, ref_type.clone()))
            .into_iter()
            .collect(),
        CompType::Func(signature) => signature
            .parameters
            .iter()
            .chain(&signature.results)
            .enumerate()
            .filter_map(|(index, val)| Some((index, val.as_ref_type()?.clone())))
            .collect(),
    }
}

/// The reference children of a struct or array, with positions; empty for signatures, which are
/// unconditionally inhabitable.
fn non_signature_ref_children(ty: &DefinedType) -> Vec<(usize, &RefType)> {
    match ty.comp_type() {
        CompType::Func(_) => Vec::new(),
        CompType::Struct(fields) => fields
            .iter()
            .enumerate()
            .filter_map(|(index, field)| Some((index, storage_ref(field)?)))
            .collect(),
        CompType::Array(element) => storage_ref(element)
            .map(|ref_type| (0, ref_type))
            .into_iter()
            .collect(),
    }
}

fn storage_ref(field: &FieldType) -> Option<&RefType> {
    match &field.1 {
        StorageType::Val(ValType::Ref(ref_type)) => Some(ref_type),
        _ => None,
    }
}

/// Returns the input filtered to its inhabitable types, in order. Unlike [`make_inhabitable`]
/// this never modifies anything.
pub fn get_inhabitable(types: &[HeapType]) -> Vec<HeapType> {
    let mut visited = HashSet::new();
    let mut visiting = HashSet::new();
    types
        .iter()
        .filter(|ty| !uninhabitable_heap(ty, &mut visited, &mut visiting))
        .cloned()
        .collect()
}

/// Recursive DFS through non-nullable references looking for bottom refs, extern refs and
/// cycles. Types left in `visiting` after a hit are themselves uninhabitable, so the sets are
/// deliberately shared across roots.
fn uninhabitable_heap(
    ty: &HeapType,
    visited: &mut HashSet<HeapType>,
    visiting: &mut HashSet<HeapType>,
) -> bool {
    let HeapType::Defined(def) = ty else {
        return false;
    };
    let body = def.comp_type();
    if matches!(body, CompType::Func(_)) {
        // Function types are always inhabitable.
        return false;
    }
    if visited.contains(ty) {
        return false;
    }
    if !visiting.insert(ty.clone()) {
        return true;
    }
    let uninhabitable = match body {
        CompType::Struct(fields) => fields
            .iter()
            .any(|field| uninhabitable_field(field, visited, visiting)),
        CompType::Array(element) => uninhabitable_field(element, visited, visiting),
        CompType::Func(_) => false,
    };
    if uninhabitable {
        return true;
    }
    visiting.remove(ty);
    visited.insert(ty.clone());
    false
}

fn uninhabitable_field(
    field: &FieldType,
    visited: &mut HashSet<HeapType>,
    visiting: &mut HashSet<HeapType>,
) -> bool {
    match &field.1 {
        StorageType::Pack(_) => false,
        StorageType::Val(val) => uninhabitable_val(val, visited, visiting),
    }
}

fn uninhabitable_val(
    val: &ValType,
    visited: &mut HashSet<HeapType>,
    visiting: &mut HashSet<HeapType>,
) -> bool {
    let ValType::Ref(ref_type) = val else {
        return false;
    };
    if ref_type.nullability != Nullability::NonNullable {
        return false;
    }
    if ref_type.heap_type.is_bottom() || ref_type.heap_type.is_abs(AbsHeapType::Extern) {
        return true;
    }
    uninhabitable_heap(&ref_type.heap_type, visited, visiting)
}
