pub mod app;
pub mod config;
pub mod database;
pub mod editor;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;
