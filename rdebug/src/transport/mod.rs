//! Wire transport

pub mod frame;
