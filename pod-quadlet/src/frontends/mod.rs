mod stack_file;

pub use stack_file::{stack_name, StackFileFrontend};
