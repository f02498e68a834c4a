pub mod formatter;
pub mod writer;

pub use writer::{write_output, OutputDocument};
