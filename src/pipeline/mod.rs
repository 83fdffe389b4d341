pub mod structuring;
pub mod generation;
