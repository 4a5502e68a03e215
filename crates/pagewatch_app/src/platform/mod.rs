pub mod app;
pub mod cli;
pub mod persistence;
pub mod settings;
