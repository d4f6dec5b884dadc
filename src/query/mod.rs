pub mod ast;
pub mod executor;
