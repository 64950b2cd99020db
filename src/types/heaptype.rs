//! Heap types classify objects in the runtime store. There are three disjoint hierarchies of heap
//! types:
//!
//! - function types classify functions,
//! - aggregate types classify dynamically allocated managed data,
//!   such as structures, arrays, or unboxed scalars,
//! - external types classify external references possibly owned by the embedder.
//!
//! A heap type is either abstract or defined. A defined heap type is a composite type declared in
//! a recursion group, optionally as a subtype of an earlier defined type. Abstract types are
//! denoted by individual keywords; each hierarchy has a top type (`func`, `extern`, `exn`, `any`)
//! and an uninhabited bottom type (`nofunc`, `noextern`, `noexn`, `none`).
//!
//! With the shared-everything proposal, every abstract and defined heap type additionally carries
//! a [`Shareability`], splitting each hierarchy into a shared and an unshared half.
//!
//! <https://webassembly.github.io/spec/core/syntax/types.html#heap-types>
use std::cell::{Cell, OnceCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::types::comptype::{CompType, TypeKind};

/// Whether a heap type may be shared between execution agents. Shareability propagates from a
/// type to its declared subtypes and constrains which defined types its children may reference.
///
/// <https://webassembly.github.io/proposals/shared-everything-threads/>
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Shareability {
    Unshared,
    Shared,
}

/// The abstract heap types, named by keyword in the text format.
///
/// `None`, `NoExtern`, `NoFunc` and `NoExn` are the bottom types of their respective hierarchies
/// and have no values.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum AbsHeapType {
    Exn,
    Array,
    Struct,
    I31,
    Eq,
    Any,
    Extern,
    Func,
    String,
    None,
    NoExtern,
    NoFunc,
    NoExn,
}

impl AbsHeapType {
    /// The bottom type of this type's hierarchy.
    pub fn bottom(self) -> AbsHeapType {
        match self {
            Self::Func | Self::NoFunc => Self::NoFunc,
            Self::Extern | Self::String | Self::NoExtern => Self::NoExtern,
            Self::Exn | Self::NoExn => Self::NoExn,
            Self::Array | Self::Struct | Self::I31 | Self::Eq | Self::Any | Self::None => {
                Self::None
            }
        }
    }

    pub fn is_bottom(self) -> bool {
        matches!(self, Self::None | Self::NoExtern | Self::NoFunc | Self::NoExn)
    }
}

/// A heap type: either an abstract heap type with a shareability, or a reference to a defined
/// composite type.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum HeapType {
    Abs(AbsHeapType, Shareability),
    Defined(DefinedType),
}

impl HeapType {
    pub fn shared(&self) -> Shareability {
        match self {
            Self::Abs(_, share) => *share,
            Self::Defined(def) => def.shared(),
        }
    }

    pub fn is_basic(&self) -> bool {
        matches!(self, Self::Abs(..))
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Self::Abs(ty, _) if ty.is_bottom())
    }

    /// True if this is the given abstract heap type, at either shareability.
    pub fn is_abs(&self, ty: AbsHeapType) -> bool {
        matches!(self, Self::Abs(t, _) if *t == ty)
    }

    /// The top-level kind of a defined heap type, or `None` for abstract types.
    pub fn kind(&self) -> Option<TypeKind> {
        match self {
            Self::Abs(..) => None,
            Self::Defined(def) => Some(def.kind()),
        }
    }

    pub fn is_signature(&self) -> bool {
        self.kind() == Some(TypeKind::Signature)
    }
}

/// A finalized defined heap type: a handle to one slot of a finished
/// [`TypeBuilder`](crate::builder::TypeBuilder) session.
///
/// Equality and hashing are by allocation identity, so two structurally identical definitions
/// from different builder sessions are distinct types. Members of a recursion group may reference
/// each other, forming `Rc` cycles; such groups are retained for the life of the program, which
/// matches the interned-type semantics this crate's consumers expect.
#[derive(Clone)]
pub struct DefinedType(Rc<TypeDef>);

pub(crate) struct TypeDef {
    /// Position of this type in the builder session that created it.
    pub(crate) index: usize,
    pub(crate) body: OnceCell<CompType>,
    pub(crate) supertype: OnceCell<DefinedType>,
    pub(crate) open: Cell<bool>,
    pub(crate) share: Cell<Shareability>,
    /// (position within the recursion group, group size).
    pub(crate) rec_group: Cell<(usize, usize)>,
}

impl DefinedType {
    pub(crate) fn new(index: usize) -> Self {
        Self(Rc::new(TypeDef {
            index,
            body: OnceCell::new(),
            supertype: OnceCell::new(),
            open: Cell::new(false),
            share: Cell::new(Shareability::Unshared),
            rec_group: Cell::new((0, 1)),
        }))
    }

    /// The composite type this heap type defines.
    ///
    /// # Panics
    ///
    /// Panics if the builder session that owns this slot has not assigned its body yet.
    pub fn comp_type(&self) -> &CompType {
        self.0
            .body
            .get()
            .expect("type body is only available once its builder session has assigned it")
    }

    /// The declared supertype, if any.
    pub fn declared_supertype(&self) -> Option<&DefinedType> {
        self.0.supertype.get()
    }

    /// Whether the type is open to further subtyping. Closed (final) types admit no nontrivial
    /// subtypes.
    pub fn is_open(&self) -> bool {
        self.0.open.get()
    }

    pub fn shared(&self) -> Shareability {
        self.0.share.get()
    }

    pub fn kind(&self) -> TypeKind {
        self.comp_type().kind()
    }

    /// Position of this type within its recursion group.
    pub fn rec_group_position(&self) -> usize {
        self.0.rec_group.get().0
    }

    /// Number of types in this type's recursion group.
    pub fn rec_group_size(&self) -> usize {
        self.0.rec_group.get().1
    }

    pub(crate) fn slot_index(&self) -> usize {
        self.0.index
    }

    pub(crate) fn def(&self) -> &TypeDef {
        &self.0
    }
}

impl PartialEq for DefinedType {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for DefinedType {}

impl Hash for DefinedType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

// Recursive types make the derived Debug non-terminating, so print only the slot index and the
// top-level kind.
impl fmt::Debug for DefinedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0.body.get() {
            Some(body) => format!("{:?}", body.kind()),
            None => "?".to_owned(),
        };
        write!(f, "DefinedType({}: {kind})", self.0.index)
    }
}
