pub mod camera;
pub mod catalog;
pub mod combat;
pub mod components;
pub mod config;
pub mod enemies;
pub mod events;
pub mod game;
pub mod phase;
pub mod pointcloud;
pub mod scene;
