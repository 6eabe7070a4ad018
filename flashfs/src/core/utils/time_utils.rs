// SPDX-License-Identifier: MIT

//! Time utilities for directory entry timestamps.
//!
//! - In `std` mode, uses the system clock.
//! - In `no_std`, returns a fixed timestamp (UNIX epoch, clamped to the FAT epoch when encoded).

use time::{OffsetDateTime, PrimitiveDateTime};

/// Returns the current UTC time.
pub fn now_utc() -> OffsetDateTime {
    #[cfg(feature = "std")]
    {
        OffsetDateTime::now_utc()
    }

    #[cfg(not(feature = "std"))]
    {
        OffsetDateTime::UNIX_EPOCH
    }
}

/// Current UTC time without offset, the form stored in directory entries.
pub fn now_timestamp() -> PrimitiveDateTime {
    let now = now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_after_fat_epoch() {
        assert!(now_utc().year() >= 1980);
        assert_eq!(now_timestamp().year(), now_utc().year());
    }
}
