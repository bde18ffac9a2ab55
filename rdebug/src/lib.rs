//! rdebug Library
//!
//! Core modules of the remote deploy server and its client.

pub mod app;
pub mod client;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod transport;
pub mod utils;
pub mod workers;
