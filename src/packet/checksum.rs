use std::net::Ipv4Addr;

/// Compute the internet checksum (RFC 1071) over `data`.
/// Wiki: https://en.wikipedia.org/wiki/Internet_checksum.
pub fn internet_checksum(data: &[u8]) -> u16 {
    fold(sum_words(data, 0))
}

/// Compute a TCP or UDP checksum, pseudo-header included.
pub fn transport_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, protocol: u8, segment: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    // Pseudo-header
    let src = src_ip.octets();
    let dst = dst_ip.octets();
    sum += u16::from_be_bytes([src[0], src[1]]) as u32;
    sum += u16::from_be_bytes([src[2], src[3]]) as u32;
    sum += u16::from_be_bytes([dst[0], dst[1]]) as u32;
    sum += u16::from_be_bytes([dst[2], dst[3]]) as u32;
    sum += protocol as u32;
    sum += segment.len() as u32;

    fold(sum_words(segment, sum))
}

fn sum_words(data: &[u8], initial: u32) -> u32 {
    // Sum every 2 bytes as a 16-bit value, padding an odd trailing byte
    data.chunks(2).fold(initial, |acc, chunk| {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        acc.wrapping_add(word as u32)
    })
}

fn fold(mut sum: u32) -> u16 {
    // Fold the carry bits
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

// -- Unit tests --
