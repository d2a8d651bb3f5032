pub mod config;
pub mod embedding;
pub mod template_engine;
pub mod text;
