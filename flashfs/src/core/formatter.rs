// SPDX-License-Identifier: MIT

pub use crate::core::errors::{FsFormatterError, FsFormatterResult};

/// Writes a fresh, empty filesystem onto a volume.
pub trait FsFormatter {
    /// `full_format` also zeroes the data region; otherwise only metadata is written.
    fn format(&mut self, full_format: bool) -> FsFormatterResult;
}
