/// Number types classify numeric values.
///
/// The types i32 and i64 classify 32 and 64 bit integers, respectively. The types f32 and f64
/// classify 32 and 64 bit floating-point data, respectively.
///
/// <https://webassembly.github.io/spec/core/syntax/types.html#number-types>
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum NumType {
    Int32,
    Int64,
    Float32,
    Float64,
}
