//! SOME/IP-TP UDP server.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::error::Result;
use crate::header::HEADER_SIZE;
use crate::message::SomeIpMessage;
use crate::types::ReturnCode;

use super::header::TP_HEADER_SIZE;
use super::reassembly::{Assembler, FlowKey, SegmentOutcome};
use super::segment::{TpSegment, TpSegmenter, TpSegmenterConfig};

/// Maximum UDP datagram size for TP messages.
const MAX_DATAGRAM_SIZE: usize = 1500;

/// A SOME/IP-TP UDP server.
///
/// Automatically reassembles incoming segments and segments large outgoing messages.
#[derive(Debug)]
pub struct TpUdpServer {
    socket: UdpSocket,
    recv_buffer: Vec<u8>,
    local_addr: SocketAddr,
    segmenter_config: TpSegmenterConfig,
    max_message_size: usize,
    assemblers: HashMap<FlowKey, Assembler>,
}

impl TpUdpServer {
    /// Bind to an address.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket,
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE],
            local_addr,
            segmenter_config: TpSegmenterConfig::default(),
            max_message_size: 1 << 20,
            assemblers: HashMap::new(),
        })
    }

    /// Get the local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Set the segmenter configuration used for outgoing large messages.
    pub fn set_segmenter_config(&mut self, config: TpSegmenterConfig) {
        self.segmenter_config = config;
    }

    /// Set the maximum size a reassembled incoming message may reach.
    pub fn set_max_message_size(&mut self, size: usize) {
        self.max_message_size = size;
    }

    /// Set read timeout.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)
    }

    /// Set non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.socket.set_nonblocking(nonblocking)
    }

    /// Receive a message, reassembling if necessary.
    ///
    /// Returns the complete message and the sender address.
    pub fn receive(&mut self) -> Result<(SomeIpMessage, SocketAddr)> {
        loop {
            let (len, addr) = self.socket.recv_from(&mut self.recv_buffer)?;
            let data = &self.recv_buffer[..len];

            if len >= HEADER_SIZE + TP_HEADER_SIZE {
                let header = crate::header::SomeIpHeader::from_bytes(&data[..HEADER_SIZE])?;

                if header.message_type.is_tp() {
                    let segment = TpSegment::from_bytes(data)?;
                    let flow = FlowKey::from_header(&segment.header, addr);
                    let assembler = self
                        .assemblers
                        .entry(flow)
                        .or_insert_with(|| Assembler::new(flow, self.max_message_size));

                    if let SegmentOutcome::Complete(message) = assembler.on_segment(&segment) {
                        return Ok((message, addr));
                    }
                    continue;
                }
            }

            let message = SomeIpMessage::from_bytes(data)?;
            return Ok((message, addr));
        }
    }

    /// Send a message to an address, segmenting if necessary.
    pub fn send_to(&self, message: &SomeIpMessage, addr: SocketAddr) -> Result<()> {
        if !super::segment::needs_segmentation(message, &self.segmenter_config) {
            let data = message.to_bytes();
            self.socket.send_to(&data, addr)?;
            return Ok(());
        }

        let socket = &self.socket;
        let mut segmenter = TpSegmenter::new();
        segmenter.segment(message, &self.segmenter_config, &mut |burst: &[TpSegment]| {
            burst
                .iter()
                .all(|segment| socket.send_to(&segment.to_bytes(), addr).is_ok())
        })
    }

    /// Send a response to a request.
    ///
    /// Creates a response message from the request and sends it. The
    /// response is automatically segmented if necessary.
    pub fn respond(
        &self,
        request: &SomeIpMessage,
        payload: impl Into<bytes::Bytes>,
        addr: SocketAddr,
    ) -> Result<()> {
        let response = request.create_response().payload(payload).build();
        self.send_to(&response, addr)
    }

    /// Send an error response to a request.
    pub fn respond_error(
        &self,
        request: &SomeIpMessage,
        return_code: ReturnCode,
        addr: SocketAddr,
    ) -> Result<()> {
        let response = request.create_error_response(return_code).build();
        self.send_to(&response, addr)
    }

    /// Get the number of active reassembly flows.
    pub fn active_reassemblies(&self) -> usize {
        self.assemblers.len()
    }

    /// Join a multicast group.
    pub fn join_multicast_v4(
        &self,
        multiaddr: &std::net::Ipv4Addr,
        interface: &std::net::Ipv4Addr,
    ) -> io::Result<()> {
        self.socket.join_multicast_v4(multiaddr, interface)
    }

    /// Leave a multicast group.
    pub fn leave_multicast_v4(
        &self,
        multiaddr: &std::net::Ipv4Addr,
        interface: &std::net::Ipv4Addr,
    ) -> io::Result<()> {
        self.socket.leave_multicast_v4(multiaddr, interface)
    }

    /// Get a reference to the underlying socket.
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{MethodId, ServiceId};
    use std::thread;

    #[test]
    fn test_tp_server_bind() {
        let server = TpUdpServer::bind("127.0.0.1:0").unwrap();
        assert!(server.local_addr().port() > 0);
    }

    #[test]
    fn test_tp_client_server_small_message() {
        use super::super::client::TpUdpClient;

        let mut server = TpUdpServer::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr();

        let server_handle = thread::spawn(move || {
            let (request, client_addr) = server.receive().unwrap();
            assert_eq!(request.header.service_id, ServiceId(0x1234));
            assert_eq!(request.payload.as_ref(), b"ping");

            server
                .respond(&request, b"pong".as_slice(), client_addr)
                .unwrap();
        });

        let mut client = TpUdpClient::new().unwrap();
        client.connect(server_addr).unwrap();

        let request = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .payload(b"ping".as_slice())
            .build();

        let response = client.call(request).unwrap();
        assert_eq!(response.payload.as_ref(), b"pong");

        server_handle.join().unwrap();
    }

    #[test]
    fn test_tp_client_server_large_message() {
        use super::super::client::TpUdpClient;
        use bytes::Bytes;

        let mut server = TpUdpServer::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr();

        let large_payload: Vec<u8> = (0..5000u16).map(|i| (i % 256) as u8).collect();
        let expected_payload = large_payload.clone();

        let server_handle = thread::spawn(move || {
            let (request, client_addr) = server.receive().unwrap();
            assert_eq!(request.header.service_id, ServiceId(0x1234));
            assert_eq!(request.payload.as_ref(), expected_payload.as_slice());

            let response_payload: Vec<u8> = (0..4000u16).map(|i| ((i + 1) % 256) as u8).collect();
            server
                .respond(&request, Bytes::from(response_payload), client_addr)
                .unwrap();
        });

        let mut client = TpUdpClient::new().unwrap();
        client.connect(server_addr).unwrap();

        let request = SomeIpMessage::request(ServiceId(0x1234), MethodId(0x0001))
            .payload_vec(large_payload)
            .build();

        let response = client.call(request).unwrap();

        let expected_response: Vec<u8> = (0..4000u16).map(|i| ((i + 1) % 256) as u8).collect();
        assert_eq!(response.payload.as_ref(), expected_response.as_slice());

        server_handle.join().unwrap();
    }
}
