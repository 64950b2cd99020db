use crate::types::valtype::ValType;

/// Function types classify the signature of functions, mapping a vector of parameters to a vector
/// of results.
///
/// Multivalue results are simply result vectors of length two or more; there is no separate tuple
/// type.
///
/// <https://webassembly.github.io/spec/core/syntax/types.html#function-types>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FuncType {
    pub parameters: Vec<ValType>,
    pub results: Vec<ValType>,
}
