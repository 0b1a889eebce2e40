//! Wire-level constants and plain types shared by the framer and the
//! reassembler.

/// ATT_MTU before any exchange has been negotiated.
pub const ATT_DEFAULT_MTU: u16 = 23;
/// Largest ATT_MTU the peripheral stack accepts.
pub const ATT_MAX_MTU: u16 = 200;

/// Matches the buffer on the peripheral side.
pub const MAX_PAYLOAD_SIZE: usize = 512;
pub const LENGTH_SIZE_IN_PKT: usize = 2;
pub const HEADER_SIZE_IN_PKT: usize = 2;
pub const CRC_SIZE_IN_PKT: usize = 4;
/// Length field plus the two header bytes.
pub const PREFIX_SIZE_IN_PKT: usize = LENGTH_SIZE_IN_PKT + HEADER_SIZE_IN_PKT;
/// Largest complete frame: prefix, payload and trailing CRC.
pub const PACKET_SIZE: usize = MAX_PAYLOAD_SIZE + PREFIX_SIZE_IN_PKT + CRC_SIZE_IN_PKT;

// First header byte: flag bits. Remaining bits are reserved and zero.
pub const HEADER_ENCRYPTED_BIT: u8 = 0x80;
pub const HEADER_ACK_ENABLED_BIT: u8 = 0x40;

// Second header byte: packet type in the high nibble, serial number in the
// low nibble.
pub const HEADER_TYPE_SHIFT: u8 = 4;
pub const HEADER_SN_MASK: u8 = 0x0f;

// GATT characteristics the engine is bound to. Bytes notified on TX or ACK
// are fed to `Context::receive`; chunks from `Interface::tx_chunk` are
// written to RX.
pub const UUID_AMDTP_SERVICE: &str = "00002760-08C2-11E1-9073-0E8AC72E1011";
pub const UUID_AMDTP_RX: &str = "00002760-08C2-11E1-9073-0E8AC72E0011";
pub const UUID_AMDTP_TX: &str = "00002760-08C2-11E1-9073-0E8AC72E0012";
pub const UUID_AMDTP_ACK: &str = "00002760-08C2-11E1-9073-0E8AC72E0013";

/// Status codes carried in ACK payloads and returned by the engine entry
/// points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success = 0x00,
    CrcError = 0x01,
    InvalidMetadata = 0x02,
    InvalidPktLength = 0x03,
    InsufficientBuffer = 0x04,
    UnknownError = 0x05,
    Busy = 0x06,
    TxNotReady = 0x07,
    ResendReply = 0x08,
    ReceiveContinue = 0x09,
    TransmitContinue = 0x0a,
    ReceiveDone = 0x0b,
}

impl Status {
    pub fn from_byte(byte: u8) -> Status {
        match byte {
            0x00 => Status::Success,
            0x01 => Status::CrcError,
            0x02 => Status::InvalidMetadata,
            0x03 => Status::InvalidPktLength,
            0x04 => Status::InsufficientBuffer,
            0x06 => Status::Busy,
            0x07 => Status::TxNotReady,
            0x08 => Status::ResendReply,
            0x09 => Status::ReceiveContinue,
            0x0a => Status::TransmitContinue,
            0x0b => Status::ReceiveDone,
            _ => Status::UnknownError,
        }
    }
}

/// Packet type from the high nibble of the second header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Unknown = 0x00,
    Data = 0x01,
    Ack = 0x02,
    Control = 0x03,
}

impl PacketType {
    pub fn from_nibble(nibble: u8) -> PacketType {
        match nibble {
            0x01 => PacketType::Data,
            0x02 => PacketType::Ack,
            0x03 => PacketType::Control,
            _ => PacketType::Unknown,
        }
    }
}

/// First payload byte of a CONTROL frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    ResendReq = 0x00,
    SendReady = 0x01,
}

impl ControlCode {
    pub fn from_byte(byte: u8) -> Option<ControlCode> {
        match byte {
            0x00 => Some(ControlCode::ResendReq),
            0x01 => Some(ControlCode::SendReady),
            _ => None,
        }
    }
}
