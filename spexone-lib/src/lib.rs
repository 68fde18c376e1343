#![doc = include_str!("../README.md")]

mod error;

pub mod l1a;
pub mod product;
pub mod spacepacket;
pub mod telemetry;

pub use error::{Error, Result};
pub use product::{Level, Product};
pub use spacepacket::{
    collect_groups, decode_packets, read_packet_file, Apid, LogicalPacket, Packet, PrimaryHeader,
    SequenceFlag, Timestamp,
};
