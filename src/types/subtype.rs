//! The subtyping relation over heap, reference, value and composite types.
//!
//! Abstract heap types form a fixed lattice per hierarchy; defined heap types relate through
//! their declared supertype chains and to the abstract tops and bottoms of their kind. Subtyping
//! never crosses shareability: the shared and unshared halves of each hierarchy are disjoint.
//!
//! <https://webassembly.github.io/spec/core/valid/matching.html>
use crate::types::comptype::{CompType, FieldType, Mut, StorageType, TypeKind};
use crate::types::heaptype::{AbsHeapType, HeapType};
use crate::types::reftype::{Exactness, Nullability, RefType};
use crate::types::valtype::ValType;

impl HeapType {
    pub fn is_subtype_of(&self, other: &HeapType) -> bool {
        if self == other {
            return true;
        }
        if self.shared() != other.shared() {
            return false;
        }
        match (self, other) {
            (Self::Abs(sub, _), Self::Abs(sup, _)) => abs_subtype(*sub, *sup),
            // The only abstract subtype of a defined type is the bottom of its hierarchy.
            (Self::Abs(sub, _), Self::Defined(def)) => match def.kind() {
                TypeKind::Signature => *sub == AbsHeapType::NoFunc,
                TypeKind::Struct | TypeKind::Array => *sub == AbsHeapType::None,
            },
            (Self::Defined(def), Self::Abs(sup, _)) => match def.kind() {
                TypeKind::Signature => *sup == AbsHeapType::Func,
                TypeKind::Struct => matches!(
                    sup,
                    AbsHeapType::Struct | AbsHeapType::Eq | AbsHeapType::Any
                ),
                TypeKind::Array => {
                    matches!(sup, AbsHeapType::Array | AbsHeapType::Eq | AbsHeapType::Any)
                }
            },
            (Self::Defined(sub), Self::Defined(sup)) => {
                let mut curr = sub.clone();
                while let Some(next) = curr.declared_supertype().cloned() {
                    if next == *sup {
                        return true;
                    }
                    curr = next;
                }
                false
            }
        }
    }
}

/// The abstract lattice, assuming equal shareability. Equal types are handled by the caller.
fn abs_subtype(sub: AbsHeapType, sup: AbsHeapType) -> bool {
    use AbsHeapType::*;
    match (sub, sup) {
        (None, Any | Eq | I31 | Struct | Array) => true,
        (NoFunc, Func) => true,
        (NoExtern, Extern | String) => true,
        (NoExn, Exn) => true,
        (Eq, Any) => true,
        (I31 | Struct | Array, Eq | Any) => true,
        (String, Extern) => true,
        _ => false,
    }
}

impl RefType {
    pub fn is_subtype_of(&self, other: &RefType) -> bool {
        if self.nullability == Nullability::Nullable && other.nullability == Nullability::NonNullable
        {
            return false;
        }
        match (self.exactness, other.exactness) {
            (_, Exactness::Inexact) => self.heap_type.is_subtype_of(&other.heap_type),
            (Exactness::Exact, Exactness::Exact) => self.heap_type == other.heap_type,
            (Exactness::Inexact, Exactness::Exact) => false,
        }
    }
}

impl ValType {
    pub fn is_subtype_of(&self, other: &ValType) -> bool {
        match (self, other) {
            (Self::Ref(sub), Self::Ref(sup)) => sub.is_subtype_of(sup),
            // Number and vector types only relate to themselves.
            _ => self == other,
        }
    }
}

/// Whether `sub` is a structurally valid composite subtype of `sup`: parameters contravariant,
/// results covariant, struct fields immutable-covariant or mutable-invariant with non-decreasing
/// width, and the array element treated like a single field.
pub fn is_valid_subtype(sub: &CompType, sup: &CompType) -> bool {
    match (sub, sup) {
        (CompType::Struct(sub_fields), CompType::Struct(sup_fields)) => {
            sub_fields.len() >= sup_fields.len()
                && sup_fields
                    .iter()
                    .zip(sub_fields)
                    .all(|(sup_field, sub_field)| field_matches(sub_field, sup_field))
        }
        (CompType::Array(sub_elem), CompType::Array(sup_elem)) => field_matches(sub_elem, sup_elem),
        (CompType::Func(sub_sig), CompType::Func(sup_sig)) => {
            sub_sig.parameters.len() == sup_sig.parameters.len()
                && sub_sig.results.len() == sup_sig.results.len()
                && sup_sig
                    .parameters
                    .iter()
                    .zip(&sub_sig.parameters)
                    .all(|(sup_param, sub_param)| sup_param.is_subtype_of(sub_param))
                && sub_sig
                    .results
                    .iter()
                    .zip(&sup_sig.results)
                    .all(|(sub_result, sup_result)| sub_result.is_subtype_of(sup_result))
        }
        _ => false,
    }
}

fn field_matches(sub: &FieldType, sup: &FieldType) -> bool {
    let (FieldType(sub_mut, sub_storage), FieldType(sup_mut, sup_storage)) = (sub, sup);
    if sub_mut != sup_mut {
        return false;
    }
    match (sup_mut, sub_storage, sup_storage) {
        // Mutable fields are invariant.
        (Mut::Var, _, _) => sub_storage == sup_storage,
        // Packed storage has no proper subtypes.
        (Mut::Const, StorageType::Pack(sub_pack), StorageType::Pack(sup_pack)) => {
            sub_pack == sup_pack
        }
        (Mut::Const, StorageType::Val(sub_val), StorageType::Val(sup_val)) => {
            sub_val.is_subtype_of(sup_val)
        }
        (Mut::Const, _, _) => false,
    }
}
