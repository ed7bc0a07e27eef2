pub mod classes;
pub mod core;
pub mod dashboard;
pub mod people;
pub mod student;
