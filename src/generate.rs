//! Random generation of well-formed heap type collections.
//!
//! Generation runs in two passes over a [`TypeBuilder`] session. The planning pass partitions
//! the slots into recursion groups and fixes every type's top-level kind, shareability and
//! declared supertype before any body exists; this is what lets the population pass hand out
//! references to types it has not constructed yet while keeping every reference inside the
//! visible prefix of the collection. The population pass then writes the bodies in index order,
//! deriving subtype bodies from their supertype's body with the appropriate variance.
use rand::Rng;

use crate::builder::TypeBuilder;
use crate::features::FeatureSet;
use crate::params::GenParams;
use crate::random::{FeatureOptions, Random};
use crate::types::comptype::{CompType, FieldType, Mut, PackType, StorageType, TypeKind};
use crate::types::functype::FuncType;
use crate::types::heaptype::{AbsHeapType, DefinedType, HeapType, Shareability};
use crate::types::numtype::NumType;
use crate::types::reftype::{Nullability, RefType};
use crate::types::valtype::ValType;
use crate::types::vectype::VecType;

/// A generated collection: the finalized types in index order, and for each index the declared
/// subtypes of that type (itself included), all listed by index.
#[derive(Debug)]
pub struct GenerateResult {
    pub types: Vec<HeapType>,
    pub subtype_indices: Vec<Vec<usize>>,
}

/// Generates `size` heap types with default [`GenParams`].
pub fn generate<R: Rng>(
    rand: &mut Random<R>,
    features: FeatureSet,
    size: usize,
) -> GenerateResult {
    generate_with(rand, features, size, &GenParams::default())
}

/// Generates `size` heap types with explicit limits.
pub fn generate_with<R: Rng>(
    rand: &mut Random<R>,
    features: FeatureSet,
    size: usize,
    params: &GenParams,
) -> GenerateResult {
    let mut generator = Generator {
        builder: TypeBuilder::new(size),
        subtype_indices: vec![Vec::new(); size],
        supertype_indices: vec![None; size],
        type_kinds: Vec::with_capacity(size),
        rec_group_ends: Vec::with_capacity(size),
        index: 0,
        rand,
        features,
        params,
    };
    generator.plan();
    generator.populate();

    let Generator {
        builder,
        subtype_indices,
        ..
    } = generator;
    let types = builder
        .build()
        .expect("internal error: generated collection failed to finalize");
    GenerateResult {
        types,
        subtype_indices,
    }
}

struct Generator<'a, R> {
    builder: TypeBuilder,
    subtype_indices: Vec<Vec<usize>>,
    supertype_indices: Vec<Option<usize>>,
    // Top-level kinds, chosen before the types are actually constructed. This is what allows
    // handing out references that are known to be subtypes of func or eq before the referenced
    // bodies exist.
    type_kinds: Vec<TypeKind>,
    // For each type, the index one past the end of its recursion group, bounding which slots may
    // appear as children of that type.
    rec_group_ends: Vec<usize>,
    // The index of the type currently being populated.
    index: usize,
    rand: &'a mut Random<R>,
    features: FeatureSet,
    params: &'a GenParams,
}

impl<R: Rng> Generator<'_, R> {
    fn plan(&mut self) {
        let size = self.builder.len();

        // The number of types generated as roots before subtyping kicks in, and the mean of the
        // geometric distribution the group sizes are drawn from.
        let num_roots = 1 + self.rand.up_to(size);
        let expected_group_size = 1 + self.rand.up_to(size);

        let mut start = 0;
        while start < size {
            start += self.plan_group(start, num_roots, expected_group_size);
        }
    }

    fn plan_group(&mut self, start: usize, num_roots: usize, expected_group_size: usize) -> usize {
        let max_size = self.builder.len() - start;
        let mut size = 1;
        while size < max_size {
            if self.rand.one_in(expected_group_size) {
                break;
            }
            size += 1;
        }
        self.builder.create_rec_group(start, size);

        let end = start + size;
        for index in start..end {
            self.rec_group_ends.push(end);
            self.plan_type(index, num_roots);
        }
        size
    }

    fn plan_type(&mut self, index: usize, num_roots: usize) {
        // Everything is a subtype of itself.
        self.subtype_indices[index].push(index);
        if index < num_roots || self.rand.one_in(2) {
            // A root type with no supertype. Choose its kind; signatures stay unshared because
            // their children are generated without the shared restriction.
            let kind = self.generate_type_kind();
            let share = if kind != TypeKind::Signature
                && self.features.has_shared_everything()
                && self.rand.one_in(2)
            {
                Shareability::Shared
            } else {
                Shareability::Unshared
            };
            self.builder.set_shared(index, share);
            self.type_kinds.push(kind);
        } else {
            // A subtype of one of the previous types. Kind and shareability follow the
            // supertype.
            let supertype = self.rand.up_to(index);
            let handle = self.builder.slot(supertype);
            let share = handle.shared();
            self.builder.sub_type_of(index, handle);
            self.builder.set_shared(index, share);
            self.supertype_indices[index] = Some(supertype);
            self.subtype_indices[supertype].push(index);
            self.type_kinds.push(self.type_kinds[supertype]);
        }
    }

    fn generate_type_kind(&mut self) -> TypeKind {
        match self.rand.up_to(3) {
            0 => TypeKind::Signature,
            1 => TypeKind::Struct,
            _ => TypeKind::Array,
        }
    }

    fn populate(&mut self) {
        for index in 0..self.builder.len() {
            self.index = index;
            // Types without nontrivial subtypes may be marked final.
            let open = self.subtype_indices[index].len() > 1 || self.rand.one_in(2);
            self.builder.set_open(index, open);

            let share = self.builder.slot(index).shared();
            let body = match self.supertype_indices[index] {
                None => match self.type_kinds[index] {
                    TypeKind::Signature => CompType::Func(self.generate_signature()),
                    TypeKind::Struct => CompType::Struct(self.generate_struct(share)),
                    TypeKind::Array => CompType::Array(self.generate_field(share)),
                },
                Some(supertype) => {
                    let super_body = self
                        .builder
                        .comp_type(supertype)
                        .expect("supertypes are populated before their subtypes")
                        .clone();
                    match super_body {
                        CompType::Func(signature) => {
                            CompType::Func(self.generate_sub_signature(&signature))
                        }
                        CompType::Struct(fields) => {
                            CompType::Struct(self.generate_sub_struct(&fields, share))
                        }
                        CompType::Array(element) => {
                            CompType::Array(self.generate_sub_field(&element))
                        }
                    }
                }
            };
            self.builder.set_comp_type(index, body);
        }
    }

    fn generate_basic_heap_type(&mut self, share: Shareability) -> HeapType {
        // Choose bottom types more rarely.
        if self.rand.one_in(16) {
            let bottom = *self.rand.pick(&[
                AbsHeapType::NoExtern,
                AbsHeapType::NoFunc,
                AbsHeapType::None,
            ]);
            return HeapType::Abs(bottom, share);
        }

        let mut options = vec![
            AbsHeapType::Func,
            AbsHeapType::Extern,
            AbsHeapType::Any,
            AbsHeapType::Eq,
            AbsHeapType::I31,
            AbsHeapType::Struct,
            AbsHeapType::Array,
        ];
        // Shared exn cannot be generated.
        if self.features.has_exception_handling() && share == Shareability::Unshared {
            options.push(AbsHeapType::Exn);
        }
        let ty = *self.rand.pick(&options);
        let share = if share == Shareability::Unshared
            && self.features.has_shared_everything()
            && ty != AbsHeapType::Exn
            && self.rand.one_in(2)
        {
            Shareability::Shared
        } else {
            share
        };
        HeapType::Abs(ty, share)
    }

    fn generate_basic_type(&mut self) -> ValType {
        let options = FeatureOptions::new()
            .add(
                FeatureSet::MVP,
                &[
                    ValType::Num(NumType::Int32),
                    ValType::Num(NumType::Int64),
                    ValType::Num(NumType::Float32),
                    ValType::Num(NumType::Float64),
                ],
            )
            .add(FeatureSet::SIMD, &[ValType::Vec(VecType::V128)]);
        self.rand.pick_features(self.features, &options)
    }

    fn generate_heap_type(&mut self, share: Shareability) -> HeapType {
        if self.rand.one_in(4) {
            return self.generate_basic_heap_type(share);
        }
        if share == Shareability::Shared {
            // Only other shared types may be referenced.
            let eligible: Vec<usize> = (0..self.rec_group_ends[self.index])
                .filter(|&index| self.builder.slot(index).shared() == Shareability::Shared)
                .collect();
            if eligible.is_empty() {
                return self.generate_basic_heap_type(share);
            }
            let index = *self.rand.pick(&eligible);
            return HeapType::Defined(self.builder.slot(index));
        }
        // Any heap type can be referenced in an unshared context.
        let index = self.rand.up_to(self.rec_group_ends[self.index]);
        HeapType::Defined(self.builder.slot(index))
    }

    fn generate_ref_type(&mut self, share: Shareability) -> ValType {
        let heap_type = self.generate_heap_type(share);
        // Non-nullable exnrefs cannot be synthesized in global positions, so never generate
        // them.
        let nullability = if heap_type.is_abs(AbsHeapType::Exn) || self.rand.one_in(2) {
            Nullability::Nullable
        } else {
            Nullability::NonNullable
        };
        self.builder.temp_ref_type(heap_type, nullability)
    }

    fn generate_single_type(&mut self, share: Shareability) -> ValType {
        match self.rand.up_to(2) {
            0 => self.generate_basic_type(),
            _ => self.generate_ref_type(share),
        }
    }

    fn generate_tuple_type(&mut self, share: Shareability) -> Vec<ValType> {
        let len = 2 + self.rand.up_to(self.params.max_tuple_size - 1);
        (0..len).map(|_| self.generate_single_type(share)).collect()
    }

    fn generate_return_type(&mut self) -> Vec<ValType> {
        if self.rand.one_in(6) {
            Vec::new()
        } else if self.features.has_multivalue() && self.rand.one_in(5) {
            self.generate_tuple_type(Shareability::Unshared)
        } else {
            vec![self.generate_single_type(Shareability::Unshared)]
        }
    }

    fn generate_signature(&mut self) -> FuncType {
        let count = self.rand.up_to_squared(self.params.max_params);
        let parameters = (0..count)
            .map(|_| self.generate_single_type(Shareability::Unshared))
            .collect();
        FuncType {
            parameters,
            results: self.generate_return_type(),
        }
    }

    fn generate_field(&mut self, share: Shareability) -> FieldType {
        let mutability = if self.rand.one_in(2) {
            Mut::Var
        } else {
            Mut::Const
        };
        if self.rand.one_in(6) {
            let pack = if self.rand.one_in(2) {
                PackType::I8
            } else {
                PackType::I16
            };
            FieldType(mutability, StorageType::Pack(pack))
        } else {
            FieldType(mutability, StorageType::Val(self.generate_single_type(share)))
        }
    }

    fn generate_struct(&mut self, share: Shareability) -> Vec<FieldType> {
        let count = self.rand.up_to(self.params.max_struct_size + 1);
        (0..count).map(|_| self.generate_field(share)).collect()
    }

    /// All planned types of the given kind and shareability visible from the current type.
    fn kind_candidates(&self, kind: TypeKind, share: Shareability) -> Vec<DefinedType> {
        (0..self.rec_group_ends[self.index])
            .filter(|&index| {
                self.type_kinds[index] == kind && self.builder.slot(index).shared() == share
            })
            .map(|index| self.builder.slot(index))
            .collect()
    }

    fn pick_kind(&mut self, kind: TypeKind, share: Shareability) -> Option<HeapType> {
        let candidates = self.kind_candidates(kind, share);
        if candidates.is_empty() {
            None
        } else {
            Some(HeapType::Defined(self.rand.pick(&candidates).clone()))
        }
    }

    fn pick_sub_of_top(
        &mut self,
        kind: TypeKind,
        top: AbsHeapType,
        bottom: AbsHeapType,
        share: Shareability,
    ) -> HeapType {
        let choice = self.rand.up_to(8);
        match choice {
            0 => HeapType::Abs(top, share),
            1 => HeapType::Abs(bottom, share),
            _ => self.pick_kind(kind, share).unwrap_or_else(|| {
                let ty = if choice % 2 == 1 { top } else { bottom };
                HeapType::Abs(ty, share)
            }),
        }
    }

    fn pick_sub_func(&mut self, share: Shareability) -> HeapType {
        self.pick_sub_of_top(
            TypeKind::Signature,
            AbsHeapType::Func,
            AbsHeapType::NoFunc,
            share,
        )
    }

    fn pick_sub_struct(&mut self, share: Shareability) -> HeapType {
        self.pick_sub_of_top(
            TypeKind::Struct,
            AbsHeapType::Struct,
            AbsHeapType::None,
            share,
        )
    }

    fn pick_sub_array(&mut self, share: Shareability) -> HeapType {
        self.pick_sub_of_top(
            TypeKind::Array,
            AbsHeapType::Array,
            AbsHeapType::None,
            share,
        )
    }

    fn pick_sub_eq(&mut self, share: Shareability) -> HeapType {
        let choice = self.rand.up_to(16);
        match choice {
            0 => HeapType::Abs(AbsHeapType::Eq, share),
            1 => HeapType::Abs(AbsHeapType::Array, share),
            2 => HeapType::Abs(AbsHeapType::Struct, share),
            3 => HeapType::Abs(AbsHeapType::None, share),
            _ => {
                let mut candidates = self.kind_candidates(TypeKind::Struct, share);
                candidates.extend(self.kind_candidates(TypeKind::Array, share));
                if !candidates.is_empty() {
                    return HeapType::Defined(self.rand.pick(&candidates).clone());
                }
                match choice >> 2 {
                    1 => HeapType::Abs(AbsHeapType::Array, share),
                    2 => HeapType::Abs(AbsHeapType::Struct, share),
                    3 => HeapType::Abs(AbsHeapType::None, share),
                    _ => HeapType::Abs(AbsHeapType::Eq, share),
                }
            }
        }
    }

    fn pick_sub_any(&mut self, share: Shareability) -> HeapType {
        match self.rand.up_to(8) {
            0 => HeapType::Abs(AbsHeapType::Any, share),
            1 => HeapType::Abs(AbsHeapType::None, share),
            _ => self.pick_sub_eq(share),
        }
    }

    /// A heap type visible from the current type that is a valid subtype of `ty`.
    fn pick_sub_heap_type(&mut self, ty: &HeapType) -> HeapType {
        let share = ty.shared();
        match ty {
            HeapType::Defined(def) => {
                // A constructed type, so its subtypes are known, but only those defined before
                // the end of the current recursion group are usable.
                let index = def.slot_index();
                let end = self.rec_group_ends[self.index];
                let candidates: Vec<DefinedType> = self.subtype_indices[index]
                    .iter()
                    .copied()
                    .filter(|&sub| sub < end)
                    .map(|sub| self.builder.slot(sub))
                    .collect();
                // Very rarely choose the relevant bottom type instead. When there are no
                // candidates at all this is certain, since one_in(0) always hits.
                if self.rand.one_in(candidates.len() * 8) {
                    let bottom = match self.type_kinds[index] {
                        TypeKind::Signature => AbsHeapType::NoFunc,
                        TypeKind::Struct | TypeKind::Array => AbsHeapType::None,
                    };
                    return HeapType::Abs(bottom, share);
                }
                HeapType::Defined(self.rand.pick(&candidates).clone())
            }
            HeapType::Abs(ty, _) => {
                if self.rand.one_in(8) {
                    return HeapType::Abs(ty.bottom(), share);
                }
                match ty {
                    AbsHeapType::Func => self.pick_sub_func(share),
                    AbsHeapType::Any => self.pick_sub_any(share),
                    AbsHeapType::Eq => self.pick_sub_eq(share),
                    AbsHeapType::Struct => self.pick_sub_struct(share),
                    AbsHeapType::Array => self.pick_sub_array(share),
                    AbsHeapType::I31
                    | AbsHeapType::Extern
                    | AbsHeapType::Exn
                    | AbsHeapType::String
                    | AbsHeapType::None
                    | AbsHeapType::NoExtern
                    | AbsHeapType::NoFunc
                    | AbsHeapType::NoExn => HeapType::Abs(*ty, share),
                }
            }
        }
    }

    /// A heap type visible from the current type that is a valid supertype of `ty`.
    fn pick_super_heap_type(&mut self, ty: &HeapType) -> HeapType {
        let share = ty.shared();
        match ty {
            HeapType::Defined(def) => {
                // A constructed type, so its supertype chain is known. Collect it along with the
                // abstract supertypes of the type's kind.
                let mut candidates = Vec::new();
                let mut curr = Some(def.slot_index());
                while let Some(index) = curr {
                    candidates.push(HeapType::Defined(self.builder.slot(index)));
                    curr = self.supertype_indices[index];
                }
                match self.type_kinds[def.slot_index()] {
                    TypeKind::Struct => candidates.extend([
                        HeapType::Abs(AbsHeapType::Struct, share),
                        HeapType::Abs(AbsHeapType::Eq, share),
                        HeapType::Abs(AbsHeapType::Any, share),
                    ]),
                    TypeKind::Array => candidates.extend([
                        HeapType::Abs(AbsHeapType::Array, share),
                        HeapType::Abs(AbsHeapType::Eq, share),
                        HeapType::Abs(AbsHeapType::Any, share),
                    ]),
                    TypeKind::Signature => {
                        candidates.push(HeapType::Abs(AbsHeapType::Func, share));
                    }
                }
                self.rand.pick(&candidates).clone()
            }
            HeapType::Abs(ty, _) => {
                let mut candidates = vec![HeapType::Abs(*ty, share)];
                match ty {
                    AbsHeapType::Extern
                    | AbsHeapType::Func
                    | AbsHeapType::Exn
                    | AbsHeapType::Any => {}
                    AbsHeapType::Eq => candidates.push(HeapType::Abs(AbsHeapType::Any, share)),
                    AbsHeapType::I31 | AbsHeapType::Struct | AbsHeapType::Array => candidates
                        .extend([
                            HeapType::Abs(AbsHeapType::Eq, share),
                            HeapType::Abs(AbsHeapType::Any, share),
                        ]),
                    AbsHeapType::String => {
                        candidates.push(HeapType::Abs(AbsHeapType::Extern, share));
                    }
                    // Anything in the hierarchy sits above its bottom type.
                    AbsHeapType::None => return self.pick_sub_any(share),
                    AbsHeapType::NoFunc => return self.pick_sub_func(share),
                    AbsHeapType::NoExtern => {
                        candidates.push(HeapType::Abs(AbsHeapType::Extern, share));
                    }
                    AbsHeapType::NoExn => candidates.push(HeapType::Abs(AbsHeapType::Exn, share)),
                }
                self.rand.pick(&candidates).clone()
            }
        }
    }

    fn generate_sub_ref(&mut self, sup: &RefType) -> RefType {
        // Exn has no subtypes to consider, and exnrefs stay nullable.
        if sup.heap_type.is_abs(AbsHeapType::Exn) {
            return sup.clone();
        }
        let nullability = if sup.nullability == Nullability::NonNullable || !self.rand.one_in(2) {
            Nullability::NonNullable
        } else {
            Nullability::Nullable
        };
        RefType::new(self.pick_sub_heap_type(&sup.heap_type), nullability)
    }

    fn generate_super_ref(&mut self, sub: &RefType) -> RefType {
        let nullability = if sub.nullability == Nullability::Nullable || self.rand.one_in(2) {
            Nullability::Nullable
        } else {
            Nullability::NonNullable
        };
        RefType::new(self.pick_super_heap_type(&sub.heap_type), nullability)
    }

    fn generate_subtype(&mut self, ty: &ValType) -> ValType {
        match ty {
            ValType::Ref(sup) => ValType::Ref(self.generate_sub_ref(sup)),
            // Number and vector types do not have subtypes.
            other => other.clone(),
        }
    }

    fn generate_supertype(&mut self, ty: &ValType) -> ValType {
        match ty {
            ValType::Ref(sub) => ValType::Ref(self.generate_super_ref(sub)),
            other => other.clone(),
        }
    }

    fn generate_sub_signature(&mut self, sup: &FuncType) -> FuncType {
        // Parameters are contravariant, results covariant.
        let parameters = sup
            .parameters
            .iter()
            .map(|param| self.generate_supertype(param))
            .collect();
        let results = sup
            .results
            .iter()
            .map(|result| self.generate_subtype(result))
            .collect();
        FuncType {
            parameters,
            results,
        }
    }

    fn generate_sub_field(&mut self, sup: &FieldType) -> FieldType {
        if sup.0 == Mut::Var {
            // Only immutable fields support subtyping.
            return sup.clone();
        }
        match &sup.1 {
            // No other subtypes of i8 or i16.
            StorageType::Pack(_) => sup.clone(),
            StorageType::Val(val) => {
                FieldType(Mut::Const, StorageType::Val(self.generate_subtype(val)))
            }
        }
    }

    fn generate_sub_struct(&mut self, sup: &[FieldType], share: Shareability) -> Vec<FieldType> {
        // Depth subtyping.
        let mut fields: Vec<FieldType> = sup
            .iter()
            .map(|field| self.generate_sub_field(field))
            .collect();
        // Width subtyping.
        let extra = self
            .rand
            .up_to((self.params.max_struct_size + 1).saturating_sub(fields.len()));
        for _ in 0..extra {
            fields.push(self.generate_field(share));
        }
        fields
    }
}
