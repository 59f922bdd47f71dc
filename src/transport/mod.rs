//! Transport layer implementations for SOME/IP.
//!
//! This module provides TCP and UDP transport implementations
//! for sending and receiving SOME/IP messages.

pub mod tcp;
pub mod udp;

pub use tcp::{TcpClient, TcpConnection, TcpServer};
pub use udp::{UdpClient, UdpServer};
