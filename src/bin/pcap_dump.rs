use clap::Parser;
use flowtap::packet::{self, TransportHeader};
use flowtap::pcap::reader::{PcapReader, PcapRecord};
use log::{error, info, warn};
use std::process;

#[derive(Parser)]
#[command(name = "pcap_dump")]
#[command(about = "Print the records of a flowtap capture file")]
struct Args {
    /// Capture file to read
    file: String,

    /// Stop after this many records
    #[arg(long)]
    limit: Option<usize>,

    /// Dump each payload as hex
    #[arg(long, action = clap::ArgAction::SetTrue)]
    hex: bool,
}

fn describe(record: &PcapRecord) -> String {
    let packet = match packet::unwrap(record.ip_packet()) {
        Ok(packet) => packet,
        Err(e) => return format!("unparsed ({})", e),
    };
    match &packet.transport {
        TransportHeader::Tcp(tcph) => format!(
            "TCP {} flags={:#04x} seq={} ack={} win={} len={}",
            packet.flow_key(),
            tcph.flags_byte(),
            tcph.seq_no,
            tcph.ack_no,
            tcph.window,
            packet.payload.len()
        ),
        TransportHeader::Udp(_) => format!("UDP {} len={}", packet.flow_key(), packet.payload.len()),
    }
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    let mut reader = PcapReader::open(&args.file).unwrap_or_else(|e| {
        error!("Unable to open {}: {}", args.file, e);
        process::exit(1);
    });

    let header = *reader.header();
    info!(
        "{}: pcap {}.{}, snaplen {}, linktype {}, byte order {:?}",
        args.file,
        header.version_major,
        header.version_minor,
        header.snaplen,
        header.linktype,
        reader.byte_order()
    );

    let limit = args.limit.unwrap_or(usize::MAX);
    let mut count = 0;
    while count < limit {
        let record = match reader.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                warn!("Stopping after {} records: {}", count, e);
                break;
            }
        };
        count += 1;

        println!(
            "#{} {}.{:06} caplen={} {}",
            count,
            record.header.ts_sec,
            record.header.ts_usec,
            record.header.caplen,
            describe(&record)
        );
        if args.hex {
            println!("{}", hex::encode(record.ip_packet()));
        }
    }
    info!("{} records", count);
}
