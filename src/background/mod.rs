pub mod control;
pub mod scheduler;
