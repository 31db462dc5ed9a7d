#![warn(rust_2018_idioms)]
#![allow(dead_code)]

#[cfg(feature = "marshal")]
pub mod marshal;

pub mod error;
pub mod sequence;
pub(crate) mod transport;

pub use transport::{TransportContext, TransportMessage, TransportProtocol};
