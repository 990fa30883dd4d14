pub mod job;
pub mod style;
pub mod wire;
