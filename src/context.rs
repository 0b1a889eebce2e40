use crate::crc32::Crc32;
use crate::packet::*;
use log::{debug, trace, warn};

/// Largest reassembled unit kept on the receive side: payload plus the
/// trailing CRC (the prefix is stripped as chunks arrive).
const RX_BUFFER_SIZE: usize = MAX_PAYLOAD_SIZE + CRC_SIZE_IN_PKT;

/// ACK and CONTROL frames carry at most two payload bytes.
const REPLY_PKT_SIZE: usize = PREFIX_SIZE_IN_PKT + 2 + CRC_SIZE_IN_PKT;

/// Error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// A frame is already in flight; retry after the peer acknowledges.
    Busy,
    /// Payload exceeds `MAX_PAYLOAD_SIZE`. The value is the number of bytes over.
    PayloadTooLarge(u16),
    /// The transmit side cannot emit a chunk in its current state.
    TxNotReady,
}

/// Transmit-side state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Sending,
    WaitingAck,
}

/// Outcome of a successful `send_data` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// The whole frame fit one chunk; now waiting for the peer ACK.
    Single,
    /// First chunk handed to the transport; the rest goes out as the peer
    /// confirms each one with SEND_READY.
    Chunked,
}

/// Engine context for one AMDTP connection.
pub struct Context<'a, 'b, T, U>
where
    T: crate::Interface,
    U: crate::Application,
{
    /// Identifier used as the log target.
    pub name: String,
    /// Transport interface, receives outbound chunks
    pub hw_if: &'a T,
    /// Application, receives reassembled payloads
    pub app: &'b U,
    /// Negotiated ATT_MTU; 3 bytes of it are ATT overhead
    mtu: u16,
    /// Announced length of the frame being reassembled (payload + CRC),
    /// zero while no frame is in progress
    rx_len: u16,
    /// Bytes of payload/CRC received so far
    rx_offset: usize,
    /// Serial number of the frame being reassembled
    rx_sn: u8,
    /// Serial number of the last data frame delivered, none until the
    /// first one arrives
    last_rx_sn: Option<u8>,
    /// Serial number the next data frame is expected to carry
    next_rx_sn: u8,
    /// Peer asked for chunk-level SEND_READY pacing on the current frame
    ack_enabled: bool,
    /// Encrypted bit seen in the current header (always rejected)
    encrypt_enabled: bool,
    /// Type of the frame being reassembled
    rx_type: PacketType,
    /// Payload and CRC received so far
    rx_buf: [u8; RX_BUFFER_SIZE],
    /// Complete frame queued for sending
    tx_buf: [u8; PACKET_SIZE],
    /// Next byte of `tx_buf` to hand to the transport
    tx_offset: usize,
    /// Total length of the queued frame
    tx_len: u16,
    /// Serial number for the next outbound data frame
    tx_sn: u8,
    /// Sending status
    tx_state: TxState,
    /// Chunks of the current frame already handed to the transport
    tx_chunk_count: u8,
    /// Chunk pacing counter: counts inbound chunks of the frame being
    /// reassembled, and holds the serial echoed by the peer's SEND_READY
    /// while sending
    chunk_ack_sn: u8,
    /// More chunks of the queued frame remain to be sent
    sending_incomplete: bool,
    crc: Crc32,
}

impl<'a, 'b, T, U> Context<'a, 'b, T, U>
where
    T: crate::Interface,
    U: crate::Application,
{
    fn reset_rx(&mut self) {
        self.rx_len = 0;
        self.rx_offset = 0;
    }

    fn reset_tx(&mut self) {
        self.tx_len = 0;
        self.tx_offset = 0;
    }

    /// Frame a payload into `tx_buf`: length prefix, header pair, payload,
    /// CRC-32 little-endian. The serial number goes out only on data frames.
    fn build_packet(&mut self, ptype: PacketType, payload: &[u8]) {
        self.reset_tx();

        let len = payload.len();
        let framed = len + CRC_SIZE_IN_PKT;
        self.tx_len = (PREFIX_SIZE_IN_PKT + framed) as u16;

        // length field counts payload plus CRC, not itself or the header
        self.tx_buf[0] = (framed & 0xff) as u8;
        self.tx_buf[1] = ((framed >> 8) & 0xff) as u8;

        let mut header1: u8 = 0;
        let mut header2: u8 = (ptype as u8) << HEADER_TYPE_SHIFT;
        if ptype == PacketType::Data {
            header2 |= self.tx_sn;
        }
        // a frame that does not fit one chunk asks the peer to pace the
        // remaining chunks with SEND_READY
        if self.tx_len > self.mtu - 3 {
            header1 |= HEADER_ACK_ENABLED_BIT;
        }
        self.tx_buf[2] = header1;
        self.tx_buf[3] = header2;

        self.tx_buf[PREFIX_SIZE_IN_PKT..PREFIX_SIZE_IN_PKT + len].copy_from_slice(payload);

        let crc = self.crc.checksum(payload);
        self.tx_buf[PREFIX_SIZE_IN_PKT + len..PREFIX_SIZE_IN_PKT + framed]
            .copy_from_slice(&crc.to_le_bytes());
    }

    /// Emit an ACK or CONTROL frame. Replies are at most `REPLY_PKT_SIZE`
    /// bytes and fit a single chunk at any legal MTU, so they go out whole
    /// and must not disturb a data frame staged in `tx_buf`.
    fn send_reply_packet(&self, ptype: PacketType, payload: &[u8]) {
        let mut pkt = [0_u8; REPLY_PKT_SIZE];
        let len = payload.len();
        let framed = len + CRC_SIZE_IN_PKT;

        pkt[0] = (framed & 0xff) as u8;
        pkt[1] = ((framed >> 8) & 0xff) as u8;
        pkt[2] = 0;
        pkt[3] = (ptype as u8) << HEADER_TYPE_SHIFT;

        pkt[PREFIX_SIZE_IN_PKT..PREFIX_SIZE_IN_PKT + len].copy_from_slice(payload);

        let crc = self.crc.checksum(payload);
        pkt[PREFIX_SIZE_IN_PKT + len..PREFIX_SIZE_IN_PKT + framed]
            .copy_from_slice(&crc.to_le_bytes());

        self.hw_if.tx_chunk(&pkt[..PREFIX_SIZE_IN_PKT + framed]);
    }

    fn send_reply(&self, status: Status) {
        debug!(target: self.name.as_str(), "send ack: status = {:?}", status);
        self.send_reply_packet(PacketType::Ack, &[status as u8]);
    }

    fn send_control(&self, code: ControlCode, sn: u8) {
        debug!(target: self.name.as_str(), "send control: {:?}, sn = {}", code, sn);
        self.send_reply_packet(PacketType::Control, &[code as u8, sn]);
    }

    /// Route a fully reassembled, CRC-checked frame by packet type.
    fn packet_handler(&mut self) -> Status {
        match self.rx_type {
            PacketType::Data => {
                debug!(target: self.name.as_str(), "data frame received: sn = {}, len = {}",
                    self.rx_sn, self.rx_offset);
                self.last_rx_sn = Some(self.rx_sn);
                self.next_rx_sn = (self.rx_sn + 1) & HEADER_SN_MASK;

                self.send_reply(Status::Success);

                let len = self.rx_offset;
                self.app.on_data(&self.rx_buf[..len]);

                self.reset_rx();
                Status::ReceiveDone
            }
            PacketType::Ack => {
                if self.rx_offset < 1 {
                    warn!(target: self.name.as_str(), "ack frame without a status byte");
                    self.reset_rx();
                    return Status::InvalidPktLength;
                }
                let status = Status::from_byte(self.rx_buf[0]);
                self.reset_rx();

                if self.tx_state != TxState::WaitingAck {
                    warn!(target: self.name.as_str(), "received an unexpected ack");
                }
                self.tx_state = TxState::Idle;

                match status {
                    Status::CrcError | Status::ResendReply => {
                        // the peer did not take the frame, send it again
                        // from the top
                        debug!(target: self.name.as_str(), "peer replied {:?}, resending sn = {}",
                            status, self.tx_sn);
                        self.send_packet_handler();
                    }
                    Status::Success => {
                        self.tx_sn = (self.tx_sn + 1) & HEADER_SN_MASK;
                    }
                    _ => {}
                }
                Status::ReceiveDone
            }
            PacketType::Control => {
                if self.rx_offset < 2 {
                    warn!(target: self.name.as_str(), "short control frame, len = {}", self.rx_offset);
                    self.reset_rx();
                    return Status::InvalidPktLength;
                }
                let control = self.rx_buf[0];
                let sn = self.rx_buf[1];
                self.reset_rx();

                match ControlCode::from_byte(control) {
                    Some(ControlCode::SendReady) => {
                        // the peer confirmed our last chunk, release the
                        // next one
                        trace!(target: self.name.as_str(), "send ready for chunk {}", sn);
                        self.chunk_ack_sn = sn;
                        self.send_packet_handler();
                        Status::ReceiveDone
                    }
                    Some(ControlCode::ResendReq) => match self.last_rx_sn {
                        Some(last) if sn > last => {
                            self.send_reply(Status::ResendReply);
                            Status::ReceiveDone
                        }
                        Some(last) if sn == last => {
                            self.send_reply(Status::Success);
                            Status::ReceiveDone
                        }
                        Some(last) => {
                            warn!(target: self.name.as_str(),
                                "cannot act on resend request: sn = {}, last delivered {}", sn, last);
                            Status::ReceiveDone
                        }
                        None => {
                            warn!(target: self.name.as_str(), "resend request before any data frame");
                            self.send_reply(Status::UnknownError);
                            Status::UnknownError
                        }
                    },
                    None => {
                        warn!(target: self.name.as_str(), "unexpected control request: {}", control);
                        Status::ReceiveDone
                    }
                }
            }
            PacketType::Unknown => {
                warn!(target: self.name.as_str(), "unknown packet type, dropping frame");
                self.reset_rx();
                Status::UnknownError
            }
        }
    }

    /// Hand the next chunk of `tx_buf` to the transport. Called once per
    /// SEND_READY until the frame is drained, then the state moves to
    /// `WaitingAck`.
    fn send_packet_handler(&mut self) -> Status {
        if self.tx_state == TxState::Idle {
            self.tx_offset = 0;
            self.tx_state = TxState::Sending;
            self.tx_chunk_count = 0;
        }

        if self.tx_state != TxState::Sending {
            debug!(target: self.name.as_str(), "could not send, tx state = {:?}", self.tx_state);
            return Status::TxNotReady;
        }

        if self.sending_incomplete && self.tx_chunk_count != self.chunk_ack_sn {
            warn!(target: self.name.as_str(), "chunks out of sequence: expected {}, got {}",
                self.tx_chunk_count, self.chunk_ack_sn);
        }

        if self.tx_offset >= self.tx_len as usize {
            return Status::TxNotReady;
        }

        let remaining = self.tx_len as usize - self.tx_offset;
        let usable = (self.mtu - 3) as usize;
        let transfer = if usable > remaining { remaining } else { usable };

        // the transport gets its own copy, never a view into tx_buf
        let mut chunk = [0_u8; ATT_MAX_MTU as usize - 3];
        chunk[..transfer].copy_from_slice(&self.tx_buf[self.tx_offset..self.tx_offset + transfer]);
        self.hw_if.tx_chunk(&chunk[..transfer]);
        self.tx_offset += transfer;

        if self.tx_offset >= self.tx_len as usize {
            trace!(target: self.name.as_str(), "frame handed to transport, waiting for ack");
            self.tx_state = TxState::WaitingAck;
            self.sending_incomplete = false;
            Status::Success
        } else {
            self.tx_chunk_count += 1;
            self.sending_incomplete = true;
            trace!(target: self.name.as_str(), "chunk {} sent, {} bytes remaining",
                self.tx_chunk_count, self.tx_len as usize - self.tx_offset);
            Status::TransmitContinue
        }
    }

    fn send_packet(&mut self, ptype: PacketType, payload: &[u8]) -> Result<SendMode, Error> {
        if self.tx_state != TxState::Idle {
            debug!(target: self.name.as_str(), "data sending failed, tx state = {:?}", self.tx_state);
            return Err(Error::Busy);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            debug!(target: self.name.as_str(), "data sending failed, exceeds maximum payload, len = {}",
                payload.len());
            return Err(Error::PayloadTooLarge((payload.len() - MAX_PAYLOAD_SIZE) as u16));
        }

        self.build_packet(ptype, payload);

        let status = self.send_packet_handler();
        if self.sending_incomplete {
            Ok(SendMode::Chunked)
        } else if status == Status::Success {
            Ok(SendMode::Single)
        } else {
            Err(Error::TxNotReady)
        }
    }
}

impl<'a, 'b, T, U> Context<'a, 'b, T, U>
where
    T: crate::Interface,
    U: crate::Application,
{
    /// Construct a `Context` for one connection.
    /// # Arguments
    /// * `name` - identifier string used as the log target.
    /// * `hw_if` - Reference of the transport interface.
    /// * `app` - Reference of the application.
    pub fn new(name: String, hw_if: &'a T, app: &'b U) -> Self {
        Context {
            name: name,
            hw_if: hw_if,
            app: app,
            mtu: ATT_DEFAULT_MTU,
            rx_len: 0,
            rx_offset: 0,
            rx_sn: 0,
            last_rx_sn: None,
            next_rx_sn: 0,
            ack_enabled: false,
            encrypt_enabled: false,
            rx_type: PacketType::Unknown,
            rx_buf: [0; RX_BUFFER_SIZE],
            tx_buf: [0; PACKET_SIZE],
            tx_offset: 0,
            tx_len: 0,
            tx_sn: 0,
            tx_state: TxState::Idle,
            tx_chunk_count: 0,
            chunk_ack_sn: 0,
            sending_incomplete: false,
            crc: Crc32::new(),
        }
    }

    /// Adopt a newly negotiated ATT_MTU. Out-of-range values are clamped
    /// silently to [`ATT_DEFAULT_MTU`, `ATT_MAX_MTU`]; only subsequent
    /// chunking is affected.
    pub fn update_mtu(&mut self, value: u16) {
        if value > ATT_MAX_MTU {
            self.mtu = ATT_MAX_MTU;
        } else if value < ATT_DEFAULT_MTU {
            self.mtu = ATT_DEFAULT_MTU;
        } else {
            self.mtu = value;
        }
    }

    /// Queue a payload for sending and emit its first chunk.
    ///
    /// Returns `SendMode::Single` when the frame went out whole (the engine
    /// is now waiting for the peer ACK), `SendMode::Chunked` when further
    /// chunks will be released by the peer's SEND_READY confirmations.
    /// # Arguments
    /// * `payload` - data to send, at most `MAX_PAYLOAD_SIZE` bytes
    pub fn send_data(&mut self, payload: &[u8]) -> Result<SendMode, Error> {
        self.send_packet(PacketType::Data, payload)
    }

    /// True once every chunk of the current frame has been handed to the
    /// transport.
    pub fn is_send_complete(&self) -> bool {
        !self.sending_incomplete
    }

    /// Feed bytes delivered by one transport notification into the
    /// reassembler.
    ///
    /// Combines chunks into a frame, verifies the CRC on completion, and
    /// dispatches by packet type. Returns `Status::ReceiveContinue` while a
    /// frame is partial, `Status::ReceiveDone` when one was delivered, or
    /// the error status that was also reported to the peer.
    pub fn receive(&mut self, data: &[u8]) -> Status {
        let len = data.len();
        let mut data_idx: usize = 0;

        // the first chunk of a frame must hold at least the prefix
        if self.rx_len == 0 && len < PREFIX_SIZE_IN_PKT {
            warn!(target: self.name.as_str(), "incomplete frame, len = {}", len);
            self.send_reply(Status::InvalidPktLength);
            return Status::InvalidPktLength;
        }

        if self.rx_len == 0 {
            self.rx_len = u16::from_le_bytes([data[0], data[1]]);
            self.chunk_ack_sn = 0;

            let header1 = data[2];
            let header2 = data[3];
            self.ack_enabled = header1 & HEADER_ACK_ENABLED_BIT != 0;
            self.encrypt_enabled = header1 & HEADER_ENCRYPTED_BIT != 0;
            self.rx_type = PacketType::from_nibble(header2 >> HEADER_TYPE_SHIFT);
            self.rx_sn = header2 & HEADER_SN_MASK;
            trace!(target: self.name.as_str(),
                "frame start: len = {}, type = {:?}, sn = {}, ack_enabled = {}",
                self.rx_len, self.rx_type, self.rx_sn, self.ack_enabled);

            if self.encrypt_enabled {
                // encryption is never negotiated on this link
                warn!(target: self.name.as_str(), "encrypted frame not supported");
                self.reset_rx();
                self.send_reply(Status::InvalidMetadata);
                return Status::InvalidMetadata;
            }
            if (self.rx_len as usize) < CRC_SIZE_IN_PKT {
                warn!(target: self.name.as_str(), "announced length {} below crc size", self.rx_len);
                self.reset_rx();
                self.send_reply(Status::InvalidPktLength);
                return Status::InvalidPktLength;
            }
            if self.rx_len as usize > RX_BUFFER_SIZE {
                warn!(target: self.name.as_str(), "announced length {} exceeds rx buffer", self.rx_len);
                self.reset_rx();
                self.send_reply(Status::InsufficientBuffer);
                return Status::InsufficientBuffer;
            }

            data_idx = PREFIX_SIZE_IN_PKT;

            if self.rx_type == PacketType::Data && self.rx_sn != self.next_rx_sn {
                // no recovery here: the sender has already overwritten its
                // tx buffer with this frame
                warn!(target: self.name.as_str(), "data frame out of sync: expected sn {}, got {}",
                    self.next_rx_sn, self.rx_sn);
            }
        }

        // payload bytes, and the trailing crc once the last chunk arrives
        let take = len - data_idx;
        if self.rx_offset + take > RX_BUFFER_SIZE {
            warn!(target: self.name.as_str(), "frame overruns rx buffer, dropping");
            self.reset_rx();
            self.send_reply(Status::InsufficientBuffer);
            return Status::InsufficientBuffer;
        }
        self.rx_buf[self.rx_offset..self.rx_offset + take].copy_from_slice(&data[data_idx..]);
        self.rx_offset += take;

        // complete frame has been received
        if self.rx_offset >= self.rx_len as usize {
            self.rx_offset -= CRC_SIZE_IN_PKT;
            let o = self.rx_offset;
            let peer_crc = u32::from_le_bytes([
                self.rx_buf[o],
                self.rx_buf[o + 1],
                self.rx_buf[o + 2],
                self.rx_buf[o + 3],
            ]);

            let calc_crc = self.crc.checksum(&self.rx_buf[..o]);
            if peer_crc != calc_crc {
                warn!(target: self.name.as_str(), "invalid crc: got {:#010x}, calculated {:#010x}",
                    peer_crc, calc_crc);
                self.reset_rx();
                self.send_reply(Status::CrcError);
                return Status::CrcError;
            }

            return self.packet_handler();
        }

        // partial frame; confirm receipt of this chunk so the sender
        // releases the next one
        if self.rx_type == PacketType::Data && self.ack_enabled {
            // chunk numbering starts at 1
            self.chunk_ack_sn += 1;
            self.send_control(ControlCode::SendReady, self.chunk_ack_sn);
        }

        Status::ReceiveContinue
    }

    pub fn get_tx_state(&self) -> TxState {
        self.tx_state
    }

    pub fn get_tx_sn(&self) -> u8 {
        self.tx_sn
    }

    pub fn get_next_rx_sn(&self) -> u8 {
        self.next_rx_sn
    }

    pub fn get_mtu(&self) -> u16 {
        self.mtu
    }
}
