pub mod app;
pub mod cli;
pub mod client;
pub mod cluster;
pub mod config;
pub mod dao;
pub mod error;
pub mod export;
pub mod forward;
pub mod input;
pub mod metrics;
pub mod model;
pub mod reconcile;
pub mod render;
pub mod ui;
