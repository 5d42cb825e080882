pub mod activities;
pub mod analytics;
pub mod attendance;
pub mod backup;
pub mod classes;
pub mod core;
pub mod grades;
pub mod students;
