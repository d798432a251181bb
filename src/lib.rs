pub mod backend;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod constants;
pub mod openai;
