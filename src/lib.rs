//! # AMDTP
//! AMDTP(AMD Transfer Protocol) exchanges payloads of up to 512 bytes
//! between a BLE central and peripheral by breaking each frame into chunks
//! that fit the agreed ATT_MTU (23 bytes by default, 20 of them usable per
//! notification). This crate is the client-side engine: framing with a
//! CRC-32 trailer, paced chunked transmission, and CRC-checked reassembly.
//!
//! The engine is transport-agnostic. Bytes notified on the TX or ACK
//! characteristic are fed to [`Context::receive`]; chunks handed to
//! [`Interface::tx_chunk`] are written to the RX characteristic.
//!
//! ## Example
//! ```
//! extern crate amdtp_rs as amdtp;
//! use std::cell::RefCell;
//!
//! struct App {
//!     received: RefCell<Vec<u8>>,
//! }
//!
//! impl amdtp::Application for App {
//!     fn on_data(&self, payload: &[u8]) {
//!         self.received.borrow_mut().extend_from_slice(payload);
//!     }
//! }
//!
//! struct Ble {
//!     written: RefCell<Vec<Vec<u8>>>,
//! }
//!
//! impl amdtp::Interface for Ble {
//!     fn tx_chunk(&self, chunk: &[u8]) {
//!         self.written.borrow_mut().push(chunk.to_vec());
//!     }
//! }
//!
//! fn main() {
//!     let app = App { received: RefCell::new(Vec::new()) };
//!     let ble = Ble { written: RefCell::new(Vec::new()) };
//!     let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);
//!
//!     // a request that fits one chunk goes out immediately
//!     match amdtp.send_data(&[0x07]) {
//!         Ok(amdtp::SendMode::Single) => {}
//!         _ => panic!("Opps!"),
//!     }
//!     assert_eq!(
//!         ble.written.borrow()[0],
//!         [0x05, 0x00, 0x00, 0x10, 0x07, 0x2e, 0x7a, 0x66, 0x4c]
//!     );
//!
//!     // the peer acknowledges and the serial number advances
//!     amdtp.receive(&[0x05, 0x00, 0x00, 0x20, 0x00, 0x8d, 0xef, 0x02, 0xd2]);
//!     assert_eq!(amdtp.get_tx_sn(), 1);
//! }
//! ```

mod context;
mod crc32;
mod interface;
mod packet;

pub use context::{Context, Error, SendMode, TxState};
pub use crc32::Crc32;
pub use interface::{Application, Interface};
pub use packet::*;
