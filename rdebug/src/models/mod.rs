//! Data models

pub mod dependency;
pub mod deployment;
