#[cfg(test)]
mod tests {
    extern crate amdtp_rs as amdtp;
    use std::cell::RefCell;

    struct App {
        received: RefCell<Vec<Vec<u8>>>,
    }

    impl App {
        fn new() -> Self {
            App {
                received: RefCell::new(Vec::new()),
            }
        }
    }

    impl amdtp::Application for App {
        fn on_data(&self, payload: &[u8]) {
            self.received.borrow_mut().push(payload.to_vec());
        }
    }

    struct Ble {
        sent: RefCell<Vec<Vec<u8>>>,
    }

    impl Ble {
        fn new() -> Self {
            Ble {
                sent: RefCell::new(Vec::new()),
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.borrow().len()
        }

        fn chunk(&self, index: usize) -> Vec<u8> {
            self.sent.borrow()[index].clone()
        }
    }

    impl amdtp::Interface for Ble {
        fn tx_chunk(&self, chunk: &[u8]) {
            self.sent.borrow_mut().push(chunk.to_vec());
        }
    }

    /// Assemble a frame the way the peer would put it on the wire.
    fn make_frame(ptype: u8, sn: u8, ack_enabled: bool, payload: &[u8]) -> Vec<u8> {
        let framed = payload.len() + 4;
        let mut frame = vec![(framed & 0xff) as u8, ((framed >> 8) & 0xff) as u8];
        frame.push(if ack_enabled { 0x40 } else { 0x00 });
        frame.push((ptype << 4) | sn);
        frame.extend_from_slice(payload);
        let crc = amdtp::Crc32::new().checksum(payload);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    fn ack_frame(status: u8) -> Vec<u8> {
        make_frame(2, 0, false, &[status])
    }

    fn send_ready_frame(sn: u8) -> Vec<u8> {
        make_frame(3, 0, false, &[0x01, sn])
    }

    #[test]
    fn single_chunk_data_frame() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);

        let mode = match amdtp.send_data(&[0x07]) {
            Ok(mode) => mode,
            Err(_) => panic!("Opps!"),
        };

        assert_eq!(mode, amdtp::SendMode::Single);
        assert_eq!(ble.sent_count(), 1);
        assert_eq!(
            ble.chunk(0),
            [
                0x05, 0x00, // length: payload + crc
                0x00, 0x10, // header: data, sn 0
                0x07, // payload
                0x2e, 0x7a, 0x66, 0x4c, // crc
            ]
        );
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::WaitingAck);

        // the peer acknowledges: 0x05 0x00 0x00 0x20 0x00 0x8d 0xef 0x02 0xd2
        let status = amdtp.receive(&ack_frame(0x00));

        assert_eq!(status, amdtp::Status::ReceiveDone);
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::Idle);
        assert_eq!(amdtp.get_tx_sn(), 1);
    }

    #[test]
    fn busy_while_frame_in_flight() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);

        amdtp.send_data(&[0x01, 0x02]).unwrap();
        assert_eq!(ble.sent_count(), 1);

        // no ACK yet, the second send must be rejected with no state change
        match amdtp.send_data(&[0x03]) {
            Err(amdtp::Error::Busy) => {}
            _ => panic!("Opps!"),
        }
        assert_eq!(ble.sent_count(), 1);
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::WaitingAck);
        assert_eq!(amdtp.get_tx_sn(), 0);
    }

    #[test]
    fn oversized_payload_rejected() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);
        let payload: [u8; 513] = [0; 513];

        match amdtp.send_data(&payload) {
            Err(amdtp::Error::PayloadTooLarge(over)) => assert_eq!(over, 1),
            _ => panic!("Opps!"),
        }
        assert_eq!(ble.sent_count(), 0);
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::Idle);
    }

    #[test]
    fn paced_multi_chunk_send() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);
        let mut payload = [0_u8; 100];
        for i in 0..payload.len() {
            payload[i] = i as u8;
        }

        let mode = match amdtp.send_data(&payload) {
            Ok(mode) => mode,
            Err(_) => panic!("Opps!"),
        };

        // 108-byte frame at the default mtu: only the first 20 bytes go out
        assert_eq!(mode, amdtp::SendMode::Chunked);
        assert_eq!(ble.sent_count(), 1);
        assert_eq!(ble.chunk(0).len(), 20);
        assert_eq!(
            &ble.chunk(0)[0..4],
            [
                0x68, 0x00, // length: 100 + 4
                0x40, 0x10, // ack_enabled; data, sn 0
            ]
        );
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::Sending);
        assert!(!amdtp.is_send_complete());

        // each SEND_READY echoing the chunk count releases one more chunk
        for sn in 1..=5 {
            let status = amdtp.receive(&send_ready_frame(sn));
            assert_eq!(status, amdtp::Status::ReceiveDone);
            assert_eq!(ble.sent_count(), sn as usize + 1);
        }
        assert_eq!(ble.chunk(5).len(), 8);
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::WaitingAck);
        assert!(amdtp.is_send_complete());

        // the chunks concatenate back into the whole frame
        let mut wire: Vec<u8> = Vec::new();
        for i in 0..6 {
            wire.extend_from_slice(&ble.chunk(i));
        }
        assert_eq!(wire.len(), 108);
        assert_eq!(&wire[4..104], &payload[..]);

        amdtp.receive(&ack_frame(0x00));
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::Idle);
        assert_eq!(amdtp.get_tx_sn(), 1);
    }

    #[test]
    fn ack_enabled_bit_tracks_chunking() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);

        // 12-byte payload frames to exactly mtu - 3 bytes: single chunk
        let mode = amdtp.send_data(&[0_u8; 12]).unwrap();
        assert_eq!(mode, amdtp::SendMode::Single);
        assert_eq!(ble.chunk(0).len(), 20);
        assert_eq!(ble.chunk(0)[2], 0x00);
        amdtp.receive(&ack_frame(0x00));

        // one byte more spills into a second chunk
        let mode = amdtp.send_data(&[0_u8; 13]).unwrap();
        assert_eq!(mode, amdtp::SendMode::Chunked);
        assert_eq!(ble.chunk(1)[2], 0x40);
        amdtp.receive(&send_ready_frame(1));
        assert_eq!(ble.chunk(2).len(), 1);
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::WaitingAck);
    }

    #[test]
    fn crc_error_resends_with_same_serial() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);

        amdtp.send_data(&[0xaa, 0xbb, 0xcc]).unwrap();
        assert_eq!(ble.sent_count(), 1);

        // the peer saw a corrupt frame: same bytes must go out again,
        // serial number unchanged
        let status = amdtp.receive(&ack_frame(0x01));
        assert_eq!(status, amdtp::Status::ReceiveDone);
        assert_eq!(ble.sent_count(), 2);
        assert_eq!(ble.chunk(1), ble.chunk(0));
        assert_eq!(amdtp.get_tx_sn(), 0);
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::WaitingAck);

        // the retry is taken and only then does the serial advance
        amdtp.receive(&ack_frame(0x00));
        assert_eq!(amdtp.get_tx_sn(), 1);
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::Idle);
    }

    #[test]
    fn resend_reply_also_triggers_retransmission() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);

        amdtp.send_data(&[0x55]).unwrap();
        amdtp.receive(&ack_frame(0x08));

        assert_eq!(ble.sent_count(), 2);
        assert_eq!(ble.chunk(1), ble.chunk(0));
        assert_eq!(amdtp.get_tx_sn(), 0);
    }

    #[test]
    fn serial_number_wraps_after_sixteen_frames() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);

        for i in 0..17 {
            amdtp.send_data(&[i as u8]).unwrap();
            let frame = ble.chunk(i);
            // packet type data in the high nibble, serial in the low
            assert_eq!(frame[3], 0x10 | (i as u8 % 16));
            amdtp.receive(&ack_frame(0x00));
            assert_eq!(amdtp.get_tx_sn(), (i as u8 + 1) % 16);
        }

        // the 17th frame carried sn 0 again
        assert_eq!(ble.chunk(16)[3], 0x10);
    }

    #[test]
    fn mtu_is_clamped_and_respected() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);

        amdtp.update_mtu(512);
        assert_eq!(amdtp.get_mtu(), 200);
        amdtp.update_mtu(10);
        assert_eq!(amdtp.get_mtu(), 23);
        amdtp.update_mtu(120);
        assert_eq!(amdtp.get_mtu(), 120);

        // a 108-byte frame fits one chunk at mtu 120
        let mode = amdtp.send_data(&[0_u8; 100]).unwrap();
        assert_eq!(mode, amdtp::SendMode::Single);
        assert_eq!(ble.sent_count(), 1);
        assert_eq!(ble.chunk(0).len(), 108);
        assert_eq!(ble.chunk(0)[2], 0x00);
    }

    #[test]
    fn unexpected_ack_still_advances_serial() {
        let app = App::new();
        let ble = Ble::new();
        let mut amdtp = amdtp::Context::new(String::from("amdtp"), &ble, &app);

        // nothing in flight: the ack is logged as unexpected, the state
        // stays idle and the serial number still advances
        let status = amdtp.receive(&ack_frame(0x00));
        assert_eq!(status, amdtp::Status::ReceiveDone);
        assert_eq!(amdtp.get_tx_state(), amdtp::TxState::Idle);
        assert_eq!(amdtp.get_tx_sn(), 1);
    }
}
