//! Type definitions for WebAssembly GC heap types.
//!
//! <https://webassembly.github.io/spec/core/syntax/types.html#types>
pub mod comptype;
pub use comptype::{CompType, FieldType, Mut, PackType, StorageType, TypeKind};

pub mod functype;
pub use functype::FuncType;

pub mod heaptype;
pub use heaptype::{AbsHeapType, DefinedType, HeapType, Shareability};

pub mod numtype;
pub use numtype::NumType;

pub mod reftype;
pub use reftype::{Exactness, Nullability, RefType};

pub mod subtype;
pub use subtype::is_valid_subtype;

pub mod valtype;
pub use valtype::ValType;

pub mod vectype;
pub use vectype::VecType;
