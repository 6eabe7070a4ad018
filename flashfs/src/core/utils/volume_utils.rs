// SPDX-License-Identifier: MIT

//! Volume serial numbers.

use core::sync::atomic::{AtomicU16, Ordering};

use time::PrimitiveDateTime;

use crate::core::utils::time_utils;

static FORMAT_SEQ: AtomicU16 = AtomicU16::new(0);

/// DOS-style serial for a volume formatted at `at`.
///
/// The high word sums hour/minute with the year, the low word sums
/// month/day with second/centisecond, as `FORMAT` does.
pub fn volume_serial_at(at: PrimitiveDateTime) -> u32 {
    let md = ((at.month() as u16) << 8) | at.day() as u16;
    let sc = ((at.second() as u16) << 8) | (at.millisecond() / 10) as u16;
    let hm = ((at.hour() as u16) << 8) | at.minute() as u16;
    let year = at.year().clamp(0, u16::MAX as i32) as u16;

    let lo = md.wrapping_add(sc);
    let hi = hm.wrapping_add(year);
    ((hi as u32) << 16) | lo as u32
}

/// Serial for a volume formatted now.
///
/// Two formats within the same centisecond still get different serials.
pub fn generate_volume_id_32() -> u32 {
    let seq = FORMAT_SEQ.fetch_add(1, Ordering::Relaxed);
    volume_serial_at(time_utils::now_timestamp()) ^ seq as u32
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_serial_from_timestamp() {
        // 2024-05-17 10:30:42.50
        let at = datetime!(2024-05-17 10:30:42.5);
        let lo = 0x0511u16 + 0x2A32;
        let hi = 0x0A1Eu16 + 2024;
        assert_eq!(volume_serial_at(at), ((hi as u32) << 16) | lo as u32);
    }

    #[test]
    fn test_generate_volume_id_32_differs() {
        assert_ne!(generate_volume_id_32(), generate_volume_id_32());
    }
}
