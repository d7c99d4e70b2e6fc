use bitflags::bitflags;

bitflags! {
    // Bit positions of the dedicated flag byte [ 0, DF, MF, 0, 0, 0, 0, 0 ]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Ipv4Flags: u8 {
        const DF = 0x40; // Don't Fragment
        const MF = 0x20; // More Fragments
    }
}

impl Ipv4Flags {
    /// Build the flag byte from the two booleans carried by an IPv4 header.
    pub fn from_bools(may_fragment: bool, last_fragment: bool) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::DF, may_fragment);
        flags.set(Self::MF, last_fragment);
        flags
    }

    /// Pack the flag byte and a 13-bit fragment offset into the 16-bit wire field.
    pub fn pack(self, frag_offset: u16) -> u16 {
        let hi = ((frag_offset >> 8) as u8 & 0x1f) | self.bits();
        u16::from_be_bytes([hi, frag_offset as u8])
    }

    /// Unpack the 16-bit wire field into the flag byte and fragment offset.
    pub fn unpack(bits: u16) -> (Self, u16) {
        let mut flags = Self::empty();
        flags.set(Self::DF, bits & 0x4000 != 0);
        flags.set(Self::MF, bits & 0x2000 != 0);
        (flags, bits & 0x1fff)
    }
}

// -- Unit tests --
