//! Random generation and repair of WebAssembly GC heap type collections.
//!
//! This library is the type-graph core of a differential fuzzer for a typed bytecode toolchain.
//! It produces arbitrary but well-formed collections of defined heap types (signatures, structs
//! and arrays) with declared subtyping, recursion groups and shareability, and it repairs
//! arbitrary collections so that every type is *inhabitable*: at least one value of each
//! reference type can be constructed without circularity.
//!
//! The main entry points are [`generate()`], [`make_inhabitable()`] and [`get_inhabitable()`].
#![forbid(unsafe_code)]

pub mod builder;
pub use builder::{BuildError, TypeBuilder};

mod features;
pub use features::FeatureSet;

mod generate;
pub use generate::{GenerateResult, generate, generate_with};

mod inhabit;
pub use inhabit::{get_inhabitable, make_inhabitable};

mod params;
pub use params::GenParams;

pub mod random;
pub use random::{FeatureOptions, Random};

pub mod types;
