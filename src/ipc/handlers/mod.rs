pub mod core;
pub mod setup;
pub mod students;
pub mod transitions;
