pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod library;
pub mod logging;
pub mod mixer;
pub mod models;
pub mod service;


pub use error::*;
pub use models::*;
