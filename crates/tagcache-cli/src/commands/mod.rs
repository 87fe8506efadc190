pub mod probe;
pub mod tags;
