pub mod application;
pub mod commands;
pub mod config;
pub mod error;
pub mod manifest;
pub mod package;
pub mod runtime;
pub mod service;
pub mod tracker;
