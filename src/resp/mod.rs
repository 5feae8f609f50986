pub mod download;
pub mod envelope;
pub mod jwt;
pub mod problem;
