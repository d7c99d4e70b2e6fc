use std::fmt;
use std::ops::{Add, Sub};

/// A 32-bit TCP sequence number. All arithmetic wraps at 2^32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Wrap32 {
    value: u32,
}

impl Wrap32 {
    pub const ZERO: Wrap32 = Wrap32 { value: 0 };

    pub fn new(value: u32) -> Self {
        Wrap32 { value }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Distance from `other` forward to `self`, modulo 2^32.
    pub fn distance_from(&self, other: Wrap32) -> u32 {
        self.value.wrapping_sub(other.value)
    }

    /// True if `self` comes strictly after `other` in sequence space (RFC 1982 serial comparison).
    pub fn is_after(&self, other: Wrap32) -> bool {
        let diff = self.distance_from(other);
        diff != 0 && diff < (1 << 31)
    }

    /// True if `self` equals `other` or comes after it.
    pub fn is_at_or_after(&self, other: Wrap32) -> bool {
        *self == other || self.is_after(other)
    }
}

impl Add for Wrap32 {
    type Output = Wrap32;

    fn add(self, other: Wrap32) -> Wrap32 {
        Wrap32::new(self.value.wrapping_add(other.value))
    }
}

impl Add<u32> for Wrap32 {
    type Output = Wrap32;

    fn add(self, n: u32) -> Wrap32 {
        Wrap32::new(self.value.wrapping_add(n))
    }
}

impl Sub<u32> for Wrap32 {
    type Output = Wrap32;

    fn sub(self, n: u32) -> Wrap32 {
        Wrap32::new(self.value.wrapping_sub(n))
    }
}

impl From<u32> for Wrap32 {
    fn from(value: u32) -> Self {
        Wrap32::new(value)
    }
}

impl fmt::Display for Wrap32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rayon::prelude::*;

    // -- Test `+` operator overload --

    #[test]
    fn test_add() {
        let x = Wrap32::new(1);
        let y = Wrap32::new(2);
        let z = Wrap32::new(3);
        assert_eq!(x + y, z);
        assert_eq!(x + 2, z);
    }

    #[test]
    fn test_add_overflow() {
        let x = Wrap32::new(u32::MAX);
        let y = Wrap32::new(1);
        let z = Wrap32::new(0);
        assert_eq!(x + y, z);
        assert_eq!(x + 1, z);
        assert_eq!(z - 1, x);
    }

    // -- Test compare --

    #[test]
    fn test_equality() {
        let wrap_a = Wrap32::new(3);
        let wrap_b = Wrap32::new(1);

        assert_ne!(wrap_a, wrap_b);
        assert_eq!(wrap_a != wrap_b, true);
        assert_eq!(wrap_a == wrap_b, false);
    }

    #[test]
    fn test_is_after() {
        assert!(Wrap32::new(2).is_after(Wrap32::new(1)));
        assert!(!Wrap32::new(1).is_after(Wrap32::new(2)));
        assert!(!Wrap32::new(1).is_after(Wrap32::new(1)));
        assert!(Wrap32::new(1).is_at_or_after(Wrap32::new(1)));
    }

    #[test]
    fn test_is_after_across_wraparound() {
        let before = Wrap32::new(u32::MAX - 10);
        let after = before + 100;
        assert_eq!(after.value(), 89);
        assert!(after.is_after(before));
        assert!(!before.is_after(after));
        assert_eq!(after.distance_from(before), 100);
    }

    #[test]
    fn test_is_after_random() {
        // Run parallel tests because we don't have all the time in the world
        (0..100_000).into_par_iter().for_each(|_| {
            let mut rng = rand::thread_rng();
            let n: u32 = rng.gen();
            let step: u32 = rng.gen_range(1..(1 << 31));
            let a = Wrap32::new(n);
            let b = a + step;

            assert!(b.is_after(a));
            assert!(!a.is_after(b));
            assert_eq!(b.distance_from(a), step);
        });
    }
}
