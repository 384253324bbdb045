pub mod generation;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod sqlite;
