use crate::types::numtype::NumType;
use crate::types::reftype::RefType;
use crate::types::vectype::VecType;

/// Value types classify the individual values that WebAssembly code can compute with and
/// the values that a variable accepts. They are either number types, vector types, or
/// reference types.
///
/// <https://webassembly.github.io/spec/core/syntax/types.html#value-types>
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ValType {
    Num(NumType),
    Vec(VecType),
    Ref(RefType),
}

impl ValType {
    pub fn as_ref_type(&self) -> Option<&RefType> {
        match self {
            Self::Ref(ty) => Some(ty),
            _ => None,
        }
    }
}
