//! HTTP API: operator surface over the automation engine plus the project
//! writes that feed it.

pub mod app;
