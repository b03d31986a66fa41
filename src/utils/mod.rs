pub mod graph;
pub mod tensor;
