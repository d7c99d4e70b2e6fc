use crate::pcap::errors::CaptureError;
use crate::pcap::ethernet::{self, ETHERNET_HEADER_LEN, ETHERTYPE_IPV4};
use crate::pcap::file_header::{ByteOrder, PcapFileHeader, FILE_HEADER_LEN};
use crate::pcap::record_header::{PcapRecordHeader, RECORD_HEADER_LEN};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcapRecord {
    pub header: PcapRecordHeader,
    pub frame: Vec<u8>,
}

impl PcapRecord {
    /// The IP packet inside an Ethernet-framed record. Frames of any other type come back whole.
    pub fn ip_packet(&self) -> &[u8] {
        match ethernet::ethertype(&self.frame) {
            Some(ETHERTYPE_IPV4) => &self.frame[ETHERNET_HEADER_LEN..],
            _ => &self.frame,
        }
    }
}

/// Reads records from a capture file in file order, honouring the file's byte order.
#[derive(Debug)]
pub struct PcapReader<R: Read> {
    input: R,
    header: PcapFileHeader,
    order: ByteOrder,
}

impl PcapReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> PcapReader<R> {
    pub fn new(mut input: R) -> Result<Self, CaptureError> {
        let mut buf = [0u8; FILE_HEADER_LEN];
        let found = read_full(&mut input, &mut buf)?;
        let (header, order) = PcapFileHeader::parse(&buf[..found])?;
        Ok(PcapReader { input, header, order })
    }

    pub fn header(&self) -> &PcapFileHeader {
        &self.header
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// The file was written in the opposite byte order.
    pub fn is_flip(&self) -> bool {
        self.order == ByteOrder::Big
    }

    /// The next record, or `None` at a clean end of file.
    pub fn next_record(&mut self) -> Result<Option<PcapRecord>, CaptureError> {
        let mut buf = [0u8; RECORD_HEADER_LEN];
        let found = read_full(&mut self.input, &mut buf)?;
        if found == 0 {
            return Ok(None);
        }
        let header = PcapRecordHeader::parse(&buf[..found], self.order)?;

        let expected = header.caplen as usize;
        let mut frame = Vec::new();
        (&mut self.input).take(header.caplen as u64).read_to_end(&mut frame)?;
        if frame.len() < expected {
            return Err(CaptureError::Truncated {
                expected,
                found: frame.len(),
            });
        }
        Ok(Some(PcapRecord { header, frame }))
    }
}

impl<R: Read> Iterator for PcapReader<R> {
    type Item = Result<PcapRecord, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Fill `buf` until it is full or the input ends. Returns the number of bytes read.
fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::test_utils;
    use crate::pcap::file_header::PCAP_MAGIC;
    use crate::pcap::writer::{CaptureFileWriter, PcapFileWriter};

    fn capture(packets: &[(Vec<u8>, u64)]) -> Vec<u8> {
        let mut writer = PcapFileWriter::new(Vec::new()).unwrap();
        for (packet, ts) in packets {
            assert!(writer.add_packet(packet, *ts).unwrap());
        }
        writer.close().unwrap();
        writer.get_ref().clone()
    }

    #[test]
    fn test_reads_records_in_order() {
        let bytes = capture(&[
            (test_utils::http_packet(), 1_500_000_000),
            (test_utils::dns_packet(), 2_000_001_000),
        ]);

        let mut reader = PcapReader::new(&bytes[..]).unwrap();
        assert!(!reader.is_flip());
        assert_eq!(*reader.header(), PcapFileHeader::default());

        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.header.ts_sec, 1);
        assert_eq!(first.header.ts_usec, 500_000);
        assert_eq!(first.header.caplen as usize, 14 + 89);
        assert_eq!(first.ip_packet(), &test_utils::http_packet()[..]);

        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.header.ts_usec, 1);
        assert_eq!(second.ip_packet(), &test_utils::dns_packet()[..]);

        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_reads_big_endian_file() {
        let packet = test_utils::dns_packet();
        let mut bytes = Vec::new();
        bytes.extend(PCAP_MAGIC.to_be_bytes());
        bytes.extend(hex::decode("0002000400000000000000000000ffff00000001").unwrap());
        bytes.extend(7u32.to_be_bytes());
        bytes.extend(9u32.to_be_bytes());
        bytes.extend(((packet.len() + 14) as u32).to_be_bytes());
        bytes.extend(((packet.len() + 14) as u32).to_be_bytes());
        bytes.extend(ethernet::stub_header());
        bytes.extend(&packet);

        let records: Vec<_> = PcapReader::new(&bytes[..]).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header.ts_sec, 7);
        assert_eq!(records[0].header.ts_usec, 9);
        assert_eq!(records[0].ip_packet(), &packet[..]);
    }

    #[test]
    fn test_truncated_record() {
        let mut bytes = capture(&[(test_utils::dns_packet(), 1)]);
        bytes.truncate(bytes.len() - 5);

        let mut reader = PcapReader::new(&bytes[..]).unwrap();
        match reader.next_record() {
            Err(CaptureError::Truncated { expected, found }) => {
                assert_eq!(expected, 14 + 57);
                assert_eq!(found, 14 + 52);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_record_header() {
        let mut bytes = capture(&[]);
        bytes.extend([0u8; 7]);

        let mut reader = PcapReader::new(&bytes[..]).unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(CaptureError::Truncated { expected: 16, found: 7 })
        ));
    }

    #[test]
    fn test_bad_magic_aborts_the_read() {
        let mut bytes = capture(&[]);
        bytes[0..4].copy_from_slice(&0x0a0d0d0au32.to_le_bytes());
        assert!(matches!(
            PcapReader::new(&bytes[..]),
            Err(CaptureError::BadMagic(0x0a0d0d0a))
        ));
    }

    #[test]
    fn test_non_ethernet_frame_is_returned_whole() {
        let record = PcapRecord {
            header: PcapRecordHeader::default(),
            frame: vec![1, 2, 3],
        };
        assert_eq!(record.ip_packet(), &[1, 2, 3]);
    }
}
