pub mod enums;
pub mod lenient;
pub mod chunk;
pub mod question;
pub mod guideline;

pub use chunk::*;
pub use question::*;
pub use guideline::*;
