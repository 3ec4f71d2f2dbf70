pub mod container;
pub mod progress;
