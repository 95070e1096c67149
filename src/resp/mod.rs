pub mod payload;
pub mod problem;
pub mod token;
