pub mod assembler;
pub mod budget;
pub mod prompts;

pub use assembler::assemble;
pub use budget::check_blocking;
pub use prompts::DEFAULT_INSTRUCTION;
