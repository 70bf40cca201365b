pub mod auth;
pub mod core;
pub mod feedback;
pub mod profile;
pub mod scores;
pub mod setup;
pub mod study;
pub mod todo;
