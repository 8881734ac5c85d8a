pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod geo;
pub mod grouper;
pub mod metadata;
pub mod orchestrator;
pub mod output;
pub mod platform;
pub mod sigv4;
pub mod upload;
