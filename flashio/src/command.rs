// SPDX-License-Identifier: MIT

//! Raw storage-protocol command channel.
//!
//! Only the commands needed to pre-condition and stream into a reserved
//! extent are modelled. Card initialization, bus timing and response
//! decoding belong to the host controller driver behind [`CommandIssuer`].

use core::fmt;

use crate::errors::*;

/// R1 card status: invalid selection of blocks for erase.
pub const R1_ERASE_PARAM: u32 = 1 << 27;

/// SD memory card commands used below the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdCommand {
    /// CMD25 WRITE_MULTIPLE_BLOCK.
    WriteMultipleBlock,
    /// CMD32 ERASE_WR_BLK_START: first block of the erase range.
    EraseWrBlkStart,
    /// CMD33 ERASE_WR_BLK_END: last block of the erase range (inclusive).
    EraseWrBlkEnd,
    /// CMD38 ERASE: erase the selected range. Argument is reserved (0).
    Erase,
}

impl SdCommand {
    /// Command index as sent on the CMD line.
    pub const fn index(self) -> u8 {
        match self {
            SdCommand::WriteMultipleBlock => 25,
            SdCommand::EraseWrBlkStart => 32,
            SdCommand::EraseWrBlkEnd => 33,
            SdCommand::Erase => 38,
        }
    }

    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            25 => Some(SdCommand::WriteMultipleBlock),
            32 => Some(SdCommand::EraseWrBlkStart),
            33 => Some(SdCommand::EraseWrBlkEnd),
            38 => Some(SdCommand::Erase),
            _ => None,
        }
    }
}

impl fmt::Display for SdCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CMD{}", self.index())
    }
}

/// Synchronous command issuer.
///
/// `send_command` blocks until the command, including any busy wait, is
/// complete or the issuer's own timeout fires.
pub trait CommandIssuer {
    fn send_command(&mut self, cmd: SdCommand, arg: u32) -> CommandResult;
}

impl<T: CommandIssuer + ?Sized> CommandIssuer for &mut T {
    #[inline]
    fn send_command(&mut self, cmd: SdCommand, arg: u32) -> CommandResult {
        (**self).send_command(cmd, arg)
    }
}

/// Multi-block writes addressed by absolute sector, bypassing any filesystem.
pub trait RawBlockWriter {
    /// Size of one addressable block in bytes.
    fn block_size(&self) -> usize;

    /// Writes `data` (a whole number of blocks) starting at block `lba`.
    fn write_blocks(&mut self, lba: u32, data: &[u8]) -> CommandResult;
}

impl<T: RawBlockWriter + ?Sized> RawBlockWriter for &mut T {
    #[inline]
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    #[inline]
    fn write_blocks(&mut self, lba: u32, data: &[u8]) -> CommandResult {
        (**self).write_blocks(lba, data)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_command_indices() {
        for cmd in [
            SdCommand::WriteMultipleBlock,
            SdCommand::EraseWrBlkStart,
            SdCommand::EraseWrBlkEnd,
            SdCommand::Erase,
        ] {
            assert_eq!(SdCommand::from_index(cmd.index()), Some(cmd));
        }
        assert_eq!(SdCommand::from_index(17), None);
        assert_eq!(format!("{}", SdCommand::Erase), "CMD38");
    }
}
