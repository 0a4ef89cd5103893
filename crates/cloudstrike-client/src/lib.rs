pub mod browser;
pub mod catalog_client;
pub mod cli;
pub mod draco;
pub mod engine;
pub mod hud;
pub mod input;
pub mod loader;
pub mod point_cache;
pub mod project_config;
pub mod renderer;
