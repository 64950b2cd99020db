use std::collections::HashMap;

use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use wagen::types::*;
use wagen::{FeatureSet, Random, TypeBuilder, generate, get_inhabitable, make_inhabitable};

fn seeded(seed: u64) -> Random<ChaCha8Rng> {
    Random::new(ChaCha8Rng::seed_from_u64(seed))
}

fn defined(ty: &HeapType) -> &DefinedType {
    match ty {
        HeapType::Defined(def) => def,
        HeapType::Abs(..) => panic!("expected a defined type, got {ty:?}"),
    }
}

fn struct_fields(ty: &HeapType) -> &[FieldType] {
    match defined(ty).comp_type() {
        CompType::Struct(fields) => fields,
        other => panic!("expected a struct, got {other:?}"),
    }
}

fn field_ref(field: &FieldType) -> &RefType {
    match &field.1 {
        StorageType::Val(ValType::Ref(ref_type)) => ref_type,
        other => panic!("expected a reference field, got {other:?}"),
    }
}

fn ref_field(mutability: Mut, heap_type: HeapType, nullability: Nullability) -> FieldType {
    FieldType(
        mutability,
        StorageType::Val(ValType::Ref(RefType::new(heap_type, nullability))),
    )
}

fn abs(ty: AbsHeapType) -> HeapType {
    HeapType::Abs(ty, Shareability::Unshared)
}

fn ref_children(body: &CompType) -> Vec<&RefType> {
    let mut refs = Vec::new();
    match body {
        CompType::Struct(fields) => {
            for FieldType(_, storage) in fields {
                if let StorageType::Val(ValType::Ref(ref_type)) = storage {
                    refs.push(ref_type);
                }
            }
        }
        CompType::Array(FieldType(_, storage)) => {
            if let StorageType::Val(ValType::Ref(ref_type)) = storage {
                refs.push(ref_type);
            }
        }
        CompType::Func(signature) => {
            for val in signature.parameters.iter().chain(&signature.results) {
                if let ValType::Ref(ref_type) = val {
                    refs.push(ref_type);
                }
            }
        }
    }
    refs
}

type Indices = HashMap<DefinedType, usize>;

fn collection_indices(types: &[HeapType]) -> Indices {
    types
        .iter()
        .enumerate()
        .filter_map(|(index, ty)| match ty {
            HeapType::Defined(def) => Some((def.clone(), index)),
            HeapType::Abs(..) => None,
        })
        .collect()
}

/// Asserts that two collections are structurally identical up to type identity.
fn assert_equivalent(left: &[HeapType], right: &[HeapType]) {
    assert_eq!(left.len(), right.len());
    let left_indices = collection_indices(left);
    let right_indices = collection_indices(right);
    for (l, r) in left.iter().zip(right) {
        match (l, r) {
            (HeapType::Abs(..), HeapType::Abs(..)) => assert_eq!(l, r),
            (HeapType::Defined(ld), HeapType::Defined(rd)) => {
                assert_eq!(ld.is_open(), rd.is_open());
                assert_eq!(ld.shared(), rd.shared());
                assert_eq!(ld.rec_group_position(), rd.rec_group_position());
                assert_eq!(ld.rec_group_size(), rd.rec_group_size());
                match (ld.declared_supertype(), rd.declared_supertype()) {
                    (None, None) => {}
                    (Some(ls), Some(rs)) => {
                        assert_heap_equivalent(
                            &HeapType::Defined(ls.clone()),
                            &HeapType::Defined(rs.clone()),
                            &left_indices,
                            &right_indices,
                        );
                    }
                    other => panic!("supertype mismatch: {other:?}"),
                }
                assert_comp_equivalent(
                    ld.comp_type(),
                    rd.comp_type(),
                    &left_indices,
                    &right_indices,
                );
            }
            other => panic!("kind mismatch: {other:?}"),
        }
    }
}

fn assert_comp_equivalent(l: &CompType, r: &CompType, li: &Indices, ri: &Indices) {
    match (l, r) {
        (CompType::Struct(lf), CompType::Struct(rf)) => {
            assert_eq!(lf.len(), rf.len());
            for (lfield, rfield) in lf.iter().zip(rf) {
                assert_field_equivalent(lfield, rfield, li, ri);
            }
        }
        (CompType::Array(le), CompType::Array(re)) => assert_field_equivalent(le, re, li, ri),
        (CompType::Func(ls), CompType::Func(rs)) => {
            assert_eq!(ls.parameters.len(), rs.parameters.len());
            assert_eq!(ls.results.len(), rs.results.len());
            for (lv, rv) in ls
                .parameters
                .iter()
                .chain(&ls.results)
                .zip(rs.parameters.iter().chain(&rs.results))
            {
                assert_val_equivalent(lv, rv, li, ri);
            }
        }
        other => panic!("composite kind mismatch: {other:?}"),
    }
}

fn assert_field_equivalent(l: &FieldType, r: &FieldType, li: &Indices, ri: &Indices) {
    assert_eq!(l.0, r.0);
    match (&l.1, &r.1) {
        (StorageType::Pack(lp), StorageType::Pack(rp)) => assert_eq!(lp, rp),
        (StorageType::Val(lv), StorageType::Val(rv)) => assert_val_equivalent(lv, rv, li, ri),
        other => panic!("storage mismatch: {other:?}"),
    }
}

fn assert_val_equivalent(l: &ValType, r: &ValType, li: &Indices, ri: &Indices) {
    match (l, r) {
        (ValType::Ref(lr), ValType::Ref(rr)) => {
            assert_eq!(lr.nullability, rr.nullability);
            assert_eq!(lr.exactness, rr.exactness);
            assert_heap_equivalent(&lr.heap_type, &rr.heap_type, li, ri);
        }
        other => assert_eq!(other.0, other.1),
    }
}

fn assert_heap_equivalent(l: &HeapType, r: &HeapType, li: &Indices, ri: &Indices) {
    match (l, r) {
        (HeapType::Abs(..), HeapType::Abs(..)) => assert_eq!(l, r),
        (HeapType::Defined(ld), HeapType::Defined(rd)) => {
            match (li.get(ld), ri.get(rd)) {
                (Some(lslot), Some(rslot)) => assert_eq!(lslot, rslot),
                // A type from outside both collections must be the same type.
                (None, None) => assert_eq!(ld, rd),
                other => panic!("reference mismatch: {other:?}"),
            }
        }
        other => panic!("heap type mismatch: {other:?}"),
    }
}

#[test]
fn bottom_ref_field_becomes_nullable() {
    let mut builder = TypeBuilder::new(1);
    builder.set_comp_type(
        0,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            abs(AbsHeapType::None),
            Nullability::NonNullable,
        )]),
    );
    let types = builder.build().unwrap();

    let repaired = make_inhabitable(&types);
    assert_eq!(repaired.len(), 1);
    let fields = struct_fields(&repaired[0]);
    assert_eq!(fields.len(), 1);
    let ref_type = field_ref(&fields[0]);
    assert_eq!(ref_type.nullability, Nullability::Nullable);
    assert!(ref_type.heap_type.is_abs(AbsHeapType::None));
}

#[test]
fn mutual_non_nullable_cycle_is_broken_once() {
    let mut builder = TypeBuilder::new(2);
    builder.create_rec_group(0, 2);
    let first = builder.slot(0);
    let second = builder.slot(1);
    builder.set_comp_type(
        0,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            HeapType::Defined(second),
            Nullability::NonNullable,
        )]),
    );
    builder.set_comp_type(
        1,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            HeapType::Defined(first),
            Nullability::NonNullable,
        )]),
    );
    let types = builder.build().unwrap();

    let repaired = make_inhabitable(&types);
    assert_eq!(repaired.len(), 2);
    let nullable = repaired
        .iter()
        .filter(|ty| field_ref(&struct_fields(ty)[0]).is_nullable())
        .count();
    // Exactly one reference in the cycle is made nullable.
    assert_eq!(nullable, 1);
    // References now point at the repaired types.
    assert_eq!(field_ref(&struct_fields(&repaired[0])[0]).heap_type, repaired[1]);
    assert_eq!(field_ref(&struct_fields(&repaired[1])[0]).heap_type, repaired[0]);
    // Both types are inhabitable now.
    assert_eq!(get_inhabitable(&repaired).len(), 2);
}

#[test]
fn self_referential_array_element_becomes_nullable() {
    let mut builder = TypeBuilder::new(1);
    builder.create_rec_group(0, 1);
    let slot = builder.slot(0);
    builder.set_comp_type(
        0,
        CompType::Array(ref_field(
            Mut::Var,
            HeapType::Defined(slot),
            Nullability::NonNullable,
        )),
    );
    let types = builder.build().unwrap();

    let repaired = make_inhabitable(&types);
    let CompType::Array(element) = defined(&repaired[0]).comp_type() else {
        panic!("expected an array");
    };
    let ref_type = field_ref(element);
    assert_eq!(ref_type.nullability, Nullability::Nullable);
    assert_eq!(ref_type.heap_type, repaired[0]);
    assert_eq!(get_inhabitable(&repaired).len(), 1);
}

#[test]
fn extern_ref_fields_become_nullable_in_super_and_sub() {
    let mut builder = TypeBuilder::new(2);
    for index in 0..2 {
        builder.set_comp_type(
            index,
            CompType::Struct(vec![ref_field(
                Mut::Const,
                abs(AbsHeapType::Extern),
                Nullability::NonNullable,
            )]),
        );
    }
    builder.set_open(0, true);
    let parent = builder.slot(0);
    builder.sub_type_of(1, parent);
    let types = builder.build().unwrap();

    let repaired = make_inhabitable(&types);
    for ty in &repaired {
        let ref_type = field_ref(&struct_fields(ty)[0]);
        assert_eq!(ref_type.nullability, Nullability::Nullable);
        assert!(ref_type.heap_type.is_abs(AbsHeapType::Extern));
    }
    let sub = defined(&repaired[1]);
    let sup = defined(&repaired[0]);
    assert_eq!(sub.declared_supertype(), Some(sup));
    assert!(is_valid_subtype(sub.comp_type(), sup.comp_type()));
}

#[test]
fn extern_ref_in_subtype_propagates_to_supertype() {
    // Only the subtype's field is non-nullable, so the supertype is reached purely through the
    // covariant propagation of the subtype's edit.
    let mut builder = TypeBuilder::new(2);
    builder.set_comp_type(
        0,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            abs(AbsHeapType::Extern),
            Nullability::Nullable,
        )]),
    );
    builder.set_comp_type(
        1,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            abs(AbsHeapType::Extern),
            Nullability::NonNullable,
        )]),
    );
    builder.set_open(0, true);
    let parent = builder.slot(0);
    builder.sub_type_of(1, parent);
    let types = builder.build().unwrap();

    let repaired = make_inhabitable(&types);
    for ty in &repaired {
        assert!(field_ref(&struct_fields(ty)[0]).is_nullable());
    }
    assert!(is_valid_subtype(
        defined(&repaired[1]).comp_type(),
        defined(&repaired[0]).comp_type(),
    ));
}

#[test]
fn mutable_bottom_field_is_nullable_in_super_and_sub() {
    let mut builder = TypeBuilder::new(2);
    builder.set_comp_type(
        0,
        CompType::Struct(vec![ref_field(
            Mut::Var,
            abs(AbsHeapType::None),
            Nullability::NonNullable,
        )]),
    );
    // The subtype copies the mutable field and widens by one unrelated field.
    builder.set_comp_type(
        1,
        CompType::Struct(vec![
            ref_field(Mut::Var, abs(AbsHeapType::None), Nullability::NonNullable),
            FieldType(Mut::Const, StorageType::Val(ValType::Num(NumType::Int32))),
        ]),
    );
    builder.set_open(0, true);
    let parent = builder.slot(0);
    builder.sub_type_of(1, parent);
    let types = builder.build().unwrap();

    let repaired = make_inhabitable(&types);
    // Invariant propagation makes the mutable field nullable in both types.
    assert!(field_ref(&struct_fields(&repaired[0])[0]).is_nullable());
    assert!(field_ref(&struct_fields(&repaired[1])[0]).is_nullable());
    // The widening field is untouched.
    assert_eq!(
        struct_fields(&repaired[1])[1],
        FieldType(Mut::Const, StorageType::Val(ValType::Num(NumType::Int32))),
    );
    assert!(is_valid_subtype(
        defined(&repaired[1]).comp_type(),
        defined(&repaired[0]).comp_type(),
    ));
}

#[test]
fn only_root_causes_are_repaired() {
    // `bad` is uninhabitable at the root; `outer` is only transitively uninhabitable, so its
    // reference keeps its nullability and is merely re-aimed at the repaired type.
    let mut builder = TypeBuilder::new(2);
    builder.set_comp_type(
        0,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            abs(AbsHeapType::None),
            Nullability::NonNullable,
        )]),
    );
    let bad = builder.slot(0);
    builder.set_comp_type(
        1,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            HeapType::Defined(bad),
            Nullability::NonNullable,
        )]),
    );
    let types = builder.build().unwrap();
    assert!(get_inhabitable(&types).is_empty());

    let repaired = make_inhabitable(&types);
    assert!(field_ref(&struct_fields(&repaired[0])[0]).is_nullable());
    let outer = field_ref(&struct_fields(&repaired[1])[0]);
    assert_eq!(outer.nullability, Nullability::NonNullable);
    assert_eq!(outer.heap_type, repaired[0]);
    assert_eq!(get_inhabitable(&repaired).len(), 2);
}

#[test]
fn basic_types_are_preserved_in_place() {
    let mut builder = TypeBuilder::new(1);
    builder.set_comp_type(
        0,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            abs(AbsHeapType::None),
            Nullability::NonNullable,
        )]),
    );
    let built = builder.build().unwrap();

    let input = vec![
        abs(AbsHeapType::I31),
        built[0].clone(),
        HeapType::Abs(AbsHeapType::Func, Shareability::Shared),
        built[0].clone(),
    ];
    let repaired = make_inhabitable(&input);
    assert_eq!(repaired.len(), 4);
    assert_eq!(repaired[0], input[0]);
    assert_eq!(repaired[2], input[2]);
    // Duplicates collapse to one repaired type.
    assert_eq!(repaired[1], repaired[3]);
    assert!(field_ref(&struct_fields(&repaired[1])[0]).is_nullable());
}

#[test]
fn signature_references_break_cycles() {
    // A struct referencing itself only through a function type stays untouched: functions can
    // be constructed regardless of their types.
    let mut builder = TypeBuilder::new(2);
    builder.create_rec_group(0, 2);
    let the_struct = builder.slot(1);
    let the_sig = builder.slot(0);
    builder.set_comp_type(
        0,
        CompType::Func(FuncType {
            parameters: Vec::new(),
            results: vec![ValType::Ref(RefType::new(
                HeapType::Defined(the_struct),
                Nullability::NonNullable,
            ))],
        }),
    );
    builder.set_comp_type(
        1,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            HeapType::Defined(the_sig),
            Nullability::NonNullable,
        )]),
    );
    let types = builder.build().unwrap();
    assert_eq!(get_inhabitable(&types).len(), 2);

    let repaired = make_inhabitable(&types);
    assert_equivalent(&types, &repaired);
}

#[test]
fn nullable_cycles_are_left_alone() {
    let mut builder = TypeBuilder::new(2);
    builder.create_rec_group(0, 2);
    let first = builder.slot(0);
    let second = builder.slot(1);
    builder.set_comp_type(
        0,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            HeapType::Defined(second),
            Nullability::Nullable,
        )]),
    );
    builder.set_comp_type(
        1,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            HeapType::Defined(first),
            Nullability::Nullable,
        )]),
    );
    let types = builder.build().unwrap();
    assert_eq!(get_inhabitable(&types).len(), 2);

    let repaired = make_inhabitable(&types);
    assert_equivalent(&types, &repaired);
}

#[test]
fn filter_preserves_order_and_drops_uninhabitable_types() {
    let mut builder = TypeBuilder::new(5);
    // An uninhabitable signature parameter does not make the signature uninhabitable.
    builder.set_comp_type(
        0,
        CompType::Func(FuncType {
            parameters: vec![ValType::Ref(RefType::new(
                abs(AbsHeapType::None),
                Nullability::NonNullable,
            ))],
            results: Vec::new(),
        }),
    );
    builder.set_comp_type(
        1,
        CompType::Struct(vec![FieldType(
            Mut::Var,
            StorageType::Val(ValType::Num(NumType::Int32)),
        )]),
    );
    builder.set_comp_type(
        2,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            abs(AbsHeapType::None),
            Nullability::NonNullable,
        )]),
    );
    builder.create_rec_group(3, 2);
    let fourth = builder.slot(4);
    let third = builder.slot(3);
    builder.set_comp_type(
        3,
        CompType::Struct(vec![ref_field(
            Mut::Const,
            HeapType::Defined(fourth),
            Nullability::NonNullable,
        )]),
    );
    builder.set_comp_type(
        4,
        CompType::Array(ref_field(
            Mut::Const,
            HeapType::Defined(third),
            Nullability::NonNullable,
        )),
    );
    let types = builder.build().unwrap();

    let inhabitable = get_inhabitable(&types);
    assert_eq!(inhabitable, vec![types[0].clone(), types[1].clone()]);
}

#[test]
fn repaired_generated_collections_are_inhabitable_and_valid() {
    let features = FeatureSet::MVP
        | FeatureSet::GC
        | FeatureSet::EXCEPTION_HANDLING
        | FeatureSet::MULTIVALUE;
    for seed in 0..10 {
        let mut rand = seeded(seed);
        let result = generate(&mut rand, features, 10);
        let repaired = make_inhabitable(&result.types);
        assert_eq!(repaired.len(), result.types.len());

        for ty in &repaired {
            let def = defined(ty);
            // No non-nullable bottom or extern references survive in struct or array bodies.
            if def.kind() != TypeKind::Signature {
                for ref_type in ref_children(def.comp_type()) {
                    if ref_type.nullability == Nullability::NonNullable {
                        assert!(!ref_type.heap_type.is_bottom());
                        assert!(!ref_type.heap_type.is_abs(AbsHeapType::Extern));
                    }
                }
            }
            // Declared subtyping stays valid.
            if let Some(sup) = def.declared_supertype() {
                assert!(is_valid_subtype(def.comp_type(), sup.comp_type()));
            }
        }
        // Every repaired type is inhabitable.
        assert_eq!(get_inhabitable(&repaired).len(), repaired.len());
    }
}

#[test]
fn repair_is_idempotent() {
    let features = FeatureSet::MVP | FeatureSet::GC | FeatureSet::MULTIVALUE;
    for seed in 0..5 {
        let mut rand = seeded(seed);
        let result = generate(&mut rand, features, 8);
        let once = make_inhabitable(&result.types);
        let twice = make_inhabitable(&once);
        assert_equivalent(&once, &twice);
    }
}

#[test]
fn empty_input_yields_empty_output() {
    assert!(make_inhabitable(&[]).is_empty());
    assert!(get_inhabitable(&[]).is_empty());
}
