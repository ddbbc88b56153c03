pub mod chunk;
pub mod field;
pub mod scales;
