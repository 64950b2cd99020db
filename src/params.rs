/// Size limits for generated types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenParams {
    /// Cap on multivalue result arity. Must be at least 2.
    pub max_tuple_size: usize,
    /// Cap on signature parameter count. Combined with the squared draw, so short parameter
    /// lists dominate.
    pub max_params: usize,
    /// Cap on struct field count.
    pub max_struct_size: usize,
}

impl Default for GenParams {
    fn default() -> Self {
        Self {
            max_tuple_size: 5,
            max_params: 10,
            max_struct_size: 20,
        }
    }
}
