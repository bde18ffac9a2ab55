//! Deployment module

pub mod fsm;
pub mod launcher;
pub mod maven;
pub mod proctable;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod workspace;
