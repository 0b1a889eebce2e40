extern crate amdtp_rs as amdtp;
use env_logger;
use log::{info, trace, LevelFilter};
use std::cell::RefCell;
use std::sync::mpsc::{channel, Sender};
use std::thread;
use std::time::{Duration, Instant};

const TEST_DATA_LEN: usize = 512;

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

    fn count(&self) -> usize {
        self.received.borrow().len()
    }
}

impl amdtp::Application for App {
    fn on_data(&self, payload: &[u8]) {
        info!(target: self.name.as_str(), "received {} bytes", payload.len());
        self.received.borrow_mut().push(payload.to_vec());
    }
}

/// One direction of the link, a chunk per notification.
struct BleLink {
    name: String,
    sender: Sender<Vec<u8>>,
}

impl amdtp::Interface for BleLink {
    fn tx_chunk(&self, chunk: &[u8]) {
        trace!(target: self.name.as_str(), "notify {} bytes", chunk.len());
        match self.sender.send(chunk.to_vec()) {
            Ok(_) => {}
            Err(e) => {
                println!("{}: {}", self.name, e);
            }
        }
    }
}

fn main() {
    log::set_max_level(LevelFilter::Info);
    env_logger::init();

    let (to_central, from_peripheral) = channel::<Vec<u8>>();
    let (to_peripheral, from_central) = channel::<Vec<u8>>();

    let peripheral_builder = thread::Builder::new().name("peripheral".into());
    let peripheral = peripheral_builder
        .spawn(move || {
            let app = App::new(String::from("peripheral-app"));
            let link = BleLink {
                name: String::from("peripheral-link"),
                sender: to_central,
            };
            let mut amdtp = amdtp::Context::new(String::from("peripheral"), &link, &app);

            let mut test_data = [0_u8; TEST_DATA_LEN];
            for i in 0..test_data.len() {
                test_data[i] = i as u8;
            }

            info!("pushing {} bytes of test data", test_data.len());
            let started = Instant::now();
            amdtp.send_data(&test_data).unwrap();

            // feed inbound chunks until the echo came back and our own
            // frame has been acknowledged
            loop {
                for chunk in from_central.try_iter().collect::<Vec<_>>() {
                    amdtp.receive(&chunk);
                }
                if app.count() == 1 && amdtp.get_tx_state() == amdtp::TxState::Idle {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }

            let elapsed = started.elapsed().as_millis();
            info!("round trip of {} bytes took {} ms", TEST_DATA_LEN, elapsed);
            assert_eq!(app.received.borrow()[0], test_data.to_vec());
        })
        .unwrap();

    let central_builder = thread::Builder::new().name("central".into());
    let central = central_builder
        .spawn(move || {
            let app = App::new(String::from("central-app"));
            let link = BleLink {
                name: String::from("central-link"),
                sender: to_peripheral,
            };
            let mut amdtp = amdtp::Context::new(String::from("central"), &link, &app);

            let mut echoed = false;
            // iter() ends once the peripheral is done and hangs up
            for chunk in from_peripheral.iter() {
                amdtp.receive(&chunk);
                if !echoed && app.count() == 1 {
                    info!("test data complete, echoing it back");
                    let data = app.received.borrow()[0].clone();
                    amdtp.send_data(&data).unwrap();
                    echoed = true;
                }
            }
            info!("peripheral hung up, central done");
        })
        .unwrap();

    peripheral.join().unwrap();
    central.join().unwrap();
}
