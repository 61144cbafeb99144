use std::fmt;

/// A traffic rate, stored as whole bytes per second.
///
/// All engine math (token refills, surplus accounting) runs in bytes, the
/// same unit the kernel's `tc_ratespec.rate` uses. Link configurations are
/// usually quoted in bits, so bit-based constructors are provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Rate(u64);

impl Rate {
    pub const ZERO: Self = Self(0);

    pub const fn from_bytes_per_sec(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_bits_per_sec(bits: u64) -> Self {
        Self(bits / 8)
    }

    pub const fn from_kbit_per_sec(kbit: u64) -> Self {
        Self(kbit * 1_000 / 8)
    }

    pub const fn from_mbit_per_sec(mbit: u64) -> Self {
        Self(mbit * 1_000_000 / 8)
    }

    pub const fn bytes_per_sec(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = self.0 * 8;
        if bits >= 1_000_000 {
            write!(f, "{:.1}Mbit/s", bits as f64 / 1_000_000.0)
        } else if bits >= 1_000 {
            write!(f, "{:.1}kbit/s", bits as f64 / 1_000.0)
        } else {
            write!(f, "{bits}bit/s")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_conversions() {
        assert_eq!(Rate::from_bits_per_sec(1_000_000).bytes_per_sec(), 125_000);
        assert_eq!(Rate::from_kbit_per_sec(256).bytes_per_sec(), 32_000);
        assert_eq!(Rate::from_mbit_per_sec(10).bytes_per_sec(), 1_250_000);
    }

    #[test]
    fn display_picks_a_sensible_unit() {
        assert_eq!(Rate::from_kbit_per_sec(256).to_string(), "256.0kbit/s");
        assert_eq!(Rate::from_mbit_per_sec(10).to_string(), "10.0Mbit/s");
    }
}
