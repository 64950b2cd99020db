/// Vector types classify vectors of numeric values processed by vector instructions (also
/// known as SIMD instructions, single instruction multiple data).
///
/// <https://webassembly.github.io/spec/core/syntax/types.html#vector-types>
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum VecType {
    V128,
}
