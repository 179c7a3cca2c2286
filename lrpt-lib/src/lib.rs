#![doc = include_str!("../README.md")]

mod error;

pub mod framing;
pub mod pipeline;
pub mod stats;

pub use error::{Error, Result};
