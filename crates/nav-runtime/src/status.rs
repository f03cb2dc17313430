//! Status bitmask returned by tile and query operations
//!
//! The high bits tell whether an operation succeeded, failed or is still in progress.
//! The low bits carry details about the outcome, such as a partial path or a result
//! buffer that was too small.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Outcome of a navigation mesh operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(u32);

impl Status {
    pub const FAILURE: Status = Status(1 << 31);
    pub const SUCCESS: Status = Status(1 << 30);
    pub const IN_PROGRESS: Status = Status(1 << 29);

    const DETAIL_MASK: u32 = 0x00ff_ffff;

    /// Input data is not recognized
    pub const WRONG_MAGIC: Status = Status(1 << 0);
    /// Input data is in the wrong version
    pub const WRONG_VERSION: Status = Status(1 << 1);
    /// A fixed capacity was exhausted
    pub const OUT_OF_MEMORY: Status = Status(1 << 2);
    /// An input parameter was invalid
    pub const INVALID_PARAM: Status = Status(1 << 3);
    /// The result buffer was too small to store all results
    pub const BUFFER_TOO_SMALL: Status = Status(1 << 4);
    /// The search ran out of nodes
    pub const OUT_OF_NODES: Status = Status(1 << 5);
    /// The search did not reach the end location, the result is a best guess
    pub const PARTIAL_RESULT: Status = Status(1 << 6);
    /// A tile is already loaded at the given coordinate
    pub const ALREADY_OCCUPIED: Status = Status(1 << 7);

    /// Raw bit pattern
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn is_success(self) -> bool {
        self.0 & Self::SUCCESS.0 != 0
    }

    pub fn is_failure(self) -> bool {
        self.0 & Self::FAILURE.0 != 0
    }

    pub fn is_in_progress(self) -> bool {
        self.0 & Self::IN_PROGRESS.0 != 0
    }

    /// Whether any bit of `detail` is set
    pub fn has_detail(self, detail: Status) -> bool {
        self.0 & detail.0 & Self::DETAIL_MASK != 0
    }

    /// Only the detail bits
    pub fn detail(self) -> Status {
        Status(self.0 & Self::DETAIL_MASK)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::SUCCESS
    }
}

impl BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

impl BitOrAssign for Status {
    fn bitor_assign(&mut self, rhs: Status) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_failure() {
            write!(f, "failure")?;
        } else if self.is_success() {
            write!(f, "success")?;
        } else if self.is_in_progress() {
            write!(f, "in progress")?;
        } else {
            write!(f, "unknown")?;
        }

        const NAMES: [(Status, &str); 8] = [
            (Status::WRONG_MAGIC, "wrong magic"),
            (Status::WRONG_VERSION, "wrong version"),
            (Status::OUT_OF_MEMORY, "out of memory"),
            (Status::INVALID_PARAM, "invalid parameter"),
            (Status::BUFFER_TOO_SMALL, "buffer too small"),
            (Status::OUT_OF_NODES, "out of nodes"),
            (Status::PARTIAL_RESULT, "partial result"),
            (Status::ALREADY_OCCUPIED, "already occupied"),
        ];
        let details: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.has_detail(*flag))
            .map(|(_, name)| *name)
            .collect();
        if !details.is_empty() {
            write!(f, " ({})", details.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

impl From<Status> for nav_common::Error {
    fn from(status: Status) -> Self {
        nav_common::Error::Query(status.to_string())
    }
}
