//! SOME/IP-TP UDP client.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};

use crate::error::Result;
use crate::header::{ClientId, SessionId, HEADER_SIZE};
use crate::message::SomeIpMessage;

use super::header::TP_HEADER_SIZE;
use super::reassembly::{Assembler, FlowKey, SegmentOutcome};
use super::segment::{TpSegment, TpSegmenter, TpSegmenterConfig};

/// Maximum UDP datagram size for TP messages.
const MAX_DATAGRAM_SIZE: usize = 1500;

/// A SOME/IP-TP UDP client.
///
/// Automatically segments large messages and reassembles incoming segments.
#[derive(Debug)]
pub struct TpUdpClient {
    socket: UdpSocket,
    client_id: ClientId,
    session_counter: AtomicU16,
    recv_buffer: Vec<u8>,
    segmenter_config: TpSegmenterConfig,
    max_message_size: usize,
    assemblers: HashMap<FlowKey, Assembler>,
}

impl TpUdpClient {
    /// Create a new TP UDP client bound to any available port.
    pub fn new() -> Result<Self> {
        Self::bind("0.0.0.0:0")
    }

    /// Create a new TP UDP client bound to a specific address.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(Self {
            socket,
            client_id: ClientId(0x0001),
            session_counter: AtomicU16::new(1),
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE],
            segmenter_config: TpSegmenterConfig::default(),
            max_message_size: 1 << 20,
            assemblers: HashMap::new(),
        })
    }

    /// Connect to a remote address.
    pub fn connect<A: ToSocketAddrs>(&self, addr: A) -> Result<()> {
        self.socket.connect(addr)?;
        Ok(())
    }

    /// Set the client ID.
    pub fn set_client_id(&mut self, client_id: ClientId) {
        self.client_id = client_id;
    }

    /// Get the client ID.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Set the segmenter configuration used for outgoing large messages.
    pub fn set_segmenter_config(&mut self, config: TpSegmenterConfig) {
        self.segmenter_config = config;
    }

    /// Set the maximum size a reassembled incoming message may reach.
    pub fn set_max_message_size(&mut self, size: usize) {
        self.max_message_size = size;
    }

    /// Get the next session ID.
    fn next_session_id(&self) -> SessionId {
        let id = self.session_counter.fetch_add(1, Ordering::Relaxed);
        if id == 0 {
            self.session_counter.store(2, Ordering::Relaxed);
            SessionId(1)
        } else {
            SessionId(id)
        }
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Set read timeout.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)
    }

    /// Set write timeout.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> io::Result<()> {
        self.socket.set_write_timeout(timeout)
    }

    /// Set non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.socket.set_nonblocking(nonblocking)
    }

    /// Send a message, segmenting if necessary.
    fn send_message(&self, message: &SomeIpMessage) -> Result<()> {
        if !super::segment::needs_segmentation(message, &self.segmenter_config) {
            let data = message.to_bytes();
            self.socket.send(&data)?;
            return Ok(());
        }

        let socket = &self.socket;
        let mut segmenter = TpSegmenter::new();
        segmenter.segment(message, &self.segmenter_config, &mut |burst: &[TpSegment]| {
            burst.iter().all(|segment| socket.send(&segment.to_bytes()).is_ok())
        })
    }

    /// Send a message to a specific address, segmenting if necessary.
    fn send_message_to(&self, addr: SocketAddr, message: &SomeIpMessage) -> Result<()> {
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

    /// Send a request to the connected address and wait for a response.
    pub fn call(&mut self, mut message: SomeIpMessage) -> Result<SomeIpMessage> {
        message.header.client_id = self.client_id;
        message.header.session_id = self.next_session_id();

        let request_id = message.header.request_id();

        self.send_message(&message)?;

        loop {
            let (response, _) = self.receive()?;

            if response.header.request_id() == request_id {
                return Ok(response);
            }
        }
    }

    /// Send a request to a specific address and wait for a response.
    pub fn call_to(&mut self, addr: SocketAddr, mut message: SomeIpMessage) -> Result<SomeIpMessage> {
        message.header.client_id = self.client_id;
        message.header.session_id = self.next_session_id();

        let request_id = message.header.request_id();

        self.send_message_to(addr, &message)?;

        loop {
            let (response, _) = self.receive()?;

            if response.header.request_id() == request_id {
                return Ok(response);
            }
        }
    }

    /// Send a fire-and-forget message to the connected address.
    pub fn send(&mut self, mut message: SomeIpMessage) -> Result<()> {
        message.header.client_id = self.client_id;
        message.header.session_id = self.next_session_id();

        self.send_message(&message)
    }

    /// Send a fire-and-forget message to a specific address.
    pub fn send_to(&mut self, addr: SocketAddr, mut message: SomeIpMessage) -> Result<()> {
        message.header.client_id = self.client_id;
        message.header.session_id = self.next_session_id();

        self.send_message_to(addr, &message)
    }

    /// Get the number of active reassembly flows.
    pub fn active_reassemblies(&self) -> usize {
        self.assemblers.len()
    }

    /// Get a reference to the underlying socket.
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }
}
