//! A small server-rendered blog: markdown posts with YAML front-matter,
//! read from a directory on every request and rendered to HTML.

pub mod config;
pub mod content_loader;
pub mod error;
pub mod hot_reload;
pub mod markdown;
pub mod models;
pub mod pages;
pub mod posts;
pub mod routes;
pub mod state;
pub mod storage;
