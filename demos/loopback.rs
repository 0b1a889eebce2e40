extern crate amdtp_rs as amdtp;
use env_logger;
use log::{debug, info, LevelFilter};
use std::cell::RefCell;
use std::collections::VecDeque;

struct App {
    name: String,
    received: RefCell<Vec<Vec<u8>>>,
}

impl App {
    fn new(name: String) -> Self {
        App {
            name: name,
            received: RefCell::new(Vec::new()),
        }
    }

    fn print_msg(&self, payload: &[u8]) {
        let mut output = String::from("");
        output.push_str(format!("receive data: [ ").as_str());
        for i in 0..payload.len() {
            output.push_str(format!("0x{:02x} ", payload[i]).as_str());
        }
        output.push_str(format!("]").as_str());
        info!(target: self.name.as_str(), "{}", output);
    }
}

impl amdtp::Application for App {
    fn on_data(&self, payload: &[u8]) {
        self.print_msg(payload);
        self.received.borrow_mut().push(payload.to_vec());
    }
}

struct Link {
    name: String,
    queue: RefCell<VecDeque<Vec<u8>>>,
}

impl Link {
    fn new(name: String) -> Self {
        Link {
            name: name,
            queue: RefCell::new(VecDeque::new()),
        }
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.queue.borrow_mut().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

impl amdtp::Interface for Link {
    fn tx_chunk(&self, chunk: &[u8]) {
        debug!(target: self.name.as_str(), "chunk out: {} bytes", chunk.len());
        self.queue.borrow_mut().push_back(chunk.to_vec());
    }
}

/// Shuttle chunks between the two engines until both links drain.
fn pump(
    central: &mut amdtp::Context<Link, App>,
    peripheral: &mut amdtp::Context<Link, App>,
    central_out: &Link,
    peripheral_out: &Link,
) {
    while !central_out.is_empty() || !peripheral_out.is_empty() {
        if let Some(chunk) = central_out.pop() {
            peripheral.receive(&chunk);
        }
        if let Some(chunk) = peripheral_out.pop() {
            central.receive(&chunk);
        }
    }
}

fn main() {
    log::set_max_level(LevelFilter::Debug);
    env_logger::init();

    let central_app = App::new(String::from("central-app"));
    let peripheral_app = App::new(String::from("peripheral-app"));
    let central_out = Link::new(String::from("central-link"));
    let peripheral_out = Link::new(String::from("peripheral-link"));
    let mut central = amdtp::Context::new(String::from("central"), &central_out, &central_app);
    let mut peripheral =
        amdtp::Context::new(String::from("peripheral"), &peripheral_out, &peripheral_app);

    let mut payload = [0_u8; 100];
    for i in 0..payload.len() {
        payload[i] = i as u8;
    }

    info!("sending {} bytes from central to peripheral", payload.len());
    match central.send_data(&payload) {
        Ok(amdtp::SendMode::Chunked) => info!("sending in chunks"),
        Ok(amdtp::SendMode::Single) => info!("sent in one chunk"),
        Err(_) => panic!("Opps!"),
    }
    pump(&mut central, &mut peripheral, &central_out, &peripheral_out);

    assert_eq!(
        peripheral_app.received.borrow()[0],
        payload.to_vec(),
        "payload did not survive the link"
    );
    info!(
        "transfer complete: central sn = {}, peripheral expects sn = {}",
        central.get_tx_sn(),
        peripheral.get_next_rx_sn()
    );

    // and the other way around
    info!("echoing the payload back");
    peripheral.send_data(&payload).unwrap();
    pump(&mut central, &mut peripheral, &central_out, &peripheral_out);

    assert_eq!(central_app.received.borrow()[0], payload.to_vec());
    info!("round trip done");
}
