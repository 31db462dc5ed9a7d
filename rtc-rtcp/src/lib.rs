#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! RTCP packets used by the loss recovery and codec feedback paths.
//!
//! Receiver reports carry reception statistics, generic NACKs carry lost sequence
//! numbers and the payload specific feedback messages (PLI, SLI, RPSI) drive the
//! VP8 reference frame logic. Anything else parses as a [`raw_packet::RawPacket`].

pub mod header;
pub mod packet;
pub mod payload_feedbacks;
pub mod raw_packet;
pub mod receiver_report;
pub mod reception_report;
pub mod transport_feedbacks;
mod util;

pub use packet::{Packet, marshal, unmarshal};
