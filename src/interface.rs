pub trait Interface {
    /// Hand one transport chunk (at most MTU - 3 bytes) to the BLE link.
    fn tx_chunk(&self, chunk: &[u8]);
}

pub trait Application {
    /// A complete, CRC-checked payload has been reassembled.
    fn on_data(&self, payload: &[u8]);
}
