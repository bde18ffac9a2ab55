//! Deploy listener

pub mod serve;
