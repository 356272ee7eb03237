//! HTTP surface of the risk engine: manual scan triggers and health.

pub mod app;
