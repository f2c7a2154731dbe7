pub mod analysis;
pub mod certification;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod scanner;
