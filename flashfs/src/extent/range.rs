// SPDX-License-Identifier: MIT

use core::fmt;

use crate::core::Lba;

/// Inclusive span of absolute sectors `[start, end]`.
///
/// Never empty: an absent range is `None`, so sector 0 stays a valid address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorRange {
    start: Lba,
    end: Lba,
}

impl SectorRange {
    /// `None` when `start > end`.
    pub const fn new(start: Lba, end: Lba) -> Option<Self> {
        if start > end {
            None
        } else {
            Some(Self { start, end })
        }
    }

    /// `count` sectors from `start`. `None` for zero sectors or past the 32-bit address space.
    pub fn from_len(start: Lba, count: u32) -> Option<Self> {
        let end = start.checked_add(count.checked_sub(1)?)?;
        Self::new(start, end)
    }

    #[inline]
    pub const fn start(&self) -> Lba {
        self.start
    }

    /// Last sector, included.
    #[inline]
    pub const fn end(&self) -> Lba {
        self.end
    }

    #[inline]
    pub const fn len(&self) -> u64 {
        (self.end - self.start) as u64 + 1
    }

    #[inline]
    pub const fn contains(&self, lba: Lba) -> bool {
        self.start <= lba && lba <= self.end
    }

    /// Drops the first `count` sectors.
    pub fn skip(&self, count: u32) -> Option<Self> {
        Self::new(self.start.checked_add(count)?, self.end)
    }

    /// Keeps at most the first `count` sectors.
    pub fn take(&self, count: u32) -> Option<Self> {
        if count as u64 >= self.len() {
            return Some(*self);
        }
        Self::from_len(self.start, count)
    }
}

impl fmt::Display for SectorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
