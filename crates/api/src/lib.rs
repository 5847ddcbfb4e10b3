//! HTTP surfaces: the producer API and the broker monitor.

pub mod app;
