use bitflags::bitflags;

bitflags! {
    // Bit positions [ NS | CWR, ECE, URG, ACK, PSH, RST, SYN, FIN ]
    // The low byte is the wire flags byte (byte 13); NS lives in the low bit of byte 12.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TcpFlags: u16 {
        const NS  = 0b1_0000_0000;
        const CWR = 0b0_1000_0000;
        const ECE = 0b0_0100_0000;
        const URG = 0b0_0010_0000;
        const ACK = 0b0_0001_0000;
        const PSH = 0b0_0000_1000;
        const RST = 0b0_0000_0100;
        const SYN = 0b0_0000_0010;
        const FIN = 0b0_0000_0001;
    }
}

impl TcpFlags {
    /// Combine the NS bit and the flags byte as they appear on the wire.
    pub fn from_wire(ns: bool, flags_byte: u8) -> Self {
        let mut flags = Self::from_bits_truncate(flags_byte as u16);
        flags.set(Self::NS, ns);
        flags
    }

    /// The wire flags byte (NS excluded).
    pub fn flags_byte(self) -> u8 {
        (self.bits() & 0xff) as u8
    }

    pub fn ns(self) -> bool {
        self.contains(Self::NS)
    }
}

// -- Unit tests --
