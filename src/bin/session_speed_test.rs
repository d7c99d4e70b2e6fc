use flowtap::config::SessionConfig;
use flowtap::session::flow::FlowKey;
use flowtap::session::session::{Session, Transport};
use rand::RngCore;
use std::collections::VecDeque;
use std::io::{self, Error, ErrorKind};
use std::net::Ipv4Addr;
use std::time::Instant;

/// Push `input_len` random bytes through a session's receive buffer in `write_size` chunks, draining
/// `read_size` bytes at a time the way segments are cut for the client.
fn speed_test(input_len: usize, capacity: usize, write_size: usize, read_size: usize) -> io::Result<()> {
    let mut rng = rand::thread_rng();
    let mut data = vec![0u8; input_len];
    rng.fill_bytes(&mut data);

    let mut chunks: VecDeque<&[u8]> = data.chunks(write_size).collect();

    let key = FlowKey::new(Ipv4Addr::new(10, 0, 0, 2), 40000, Ipv4Addr::new(93, 184, 216, 34), 80);
    let config = SessionConfig {
        receive_buffer_capacity: capacity,
        ..Default::default()
    };
    let session = Session::new(key, Transport::Tcp, &config);
    let mut output_buffer = Vec::with_capacity(input_len);
    let mut buffered = 0;

    let t0 = Instant::now();

    while !chunks.is_empty() || session.has_received_data() {
        if let Some(front) = chunks.front() {
            if buffered + front.len() <= capacity {
                session.add_received_data(front);
                buffered += front.len();
                chunks.pop_front();
            }
        }

        let segment = session.take_received_data(read_size);
        if segment.is_empty() && chunks.is_empty() {
            return Err(Error::new(ErrorKind::Other, "receive buffer lost data"));
        }
        buffered -= segment.len();
        output_buffer.extend_from_slice(&segment);
    }

    let duration = t0.elapsed();

    if data != output_buffer {
        return Err(Error::new(ErrorKind::Other, "Data written does not equal data read"));
    }

    let gigabits_per_sec = input_len as f64 * 8.0 / duration.as_secs_f64() / 1e9;
    println!(
        "Session buffer with capacity={}, write_size={}, read_size={} reached {:.2} Gbit/s",
        capacity, write_size, read_size, gigabits_per_sec
    );
    Ok(())
}

fn main() {
    let input_len = 1e7 as usize; // 10 MB
    let capacity = 65536;
    let write_size = 1500; // MTU
    let read_size = 1400; // MSS 1460 minus header room

    if let Err(e) = speed_test(input_len, capacity, write_size, read_size) {
        eprintln!("Speed test failed: {}", e);
        std::process::exit(1);
    }
}
