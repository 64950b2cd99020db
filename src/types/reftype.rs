use crate::types::heaptype::HeapType;

/// Reference types classify first-class references to objects in the runtime store. A reference
/// type is a heap type together with a nullability; non-nullable references exclude the null
/// value and therefore require a constructible value of the heap type.
///
/// Reference types are opaque, meaning that neither their size nor their bit pattern can be
/// observed.
///
/// <https://webassembly.github.io/spec/core/syntax/types.html#reference-types>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RefType {
    pub heap_type: HeapType,
    pub nullability: Nullability,
    pub exactness: Exactness,
}

impl RefType {
    /// An inexact reference, the common case.
    pub fn new(heap_type: HeapType, nullability: Nullability) -> Self {
        Self {
            heap_type,
            nullability,
            exactness: Exactness::Inexact,
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.nullability == Nullability::Nullable
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Nullability {
    Nullable,
    NonNullable,
}

/// An exact reference classifies values of precisely its heap type, excluding proper subtypes.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Exactness {
    Exact,
    Inexact,
}
