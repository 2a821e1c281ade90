pub mod database;
pub mod entity;
pub mod error;
pub mod file_system;
