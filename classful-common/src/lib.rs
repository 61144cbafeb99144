//! Common collaborators shared by the classful crates: the monotonic clock
//! seam, the [`Rate`] unit type, and size constants.

mod clock;
pub use clock::{Clock, ManualClock, MonotonicClock};

mod rate;
pub use rate::Rate;

/// Standard Ethernet MTU in bytes.
pub const MTU_ETHERNET: u32 = 1_500;

#[allow(non_upper_case_globals)]
pub mod constants {
    pub const KiB: u32 = 1024;
    pub const MiB: u32 = 1024 * KiB;
    pub const GiB: u32 = 1024 * MiB;
}
