// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for BlockIO operations.
pub type BlockIOResult<T = ()> = core::result::Result<T, BlockIOError>;

/// Error type for BlockIO operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIOError {
    Other(&'static str),
    OutOfBounds,
    Unaligned,
    Unsupported,
}

impl BlockIOError {
    pub fn msg(&self) -> &'static str {
        match self {
            BlockIOError::Other(msg) => msg,
            BlockIOError::OutOfBounds => "Out of bounds",
            BlockIOError::Unaligned => "Access not aligned to sector size",
            BlockIOError::Unsupported => "Unsupported operation",
        }
    }
}

impl From<&'static str> for BlockIOError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        BlockIOError::Other(msg)
    }
}

impl fmt::Display for BlockIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        Ok(())
    }
}

/// Result type for raw storage-protocol commands.
pub type CommandResult<T = ()> = core::result::Result<T, CommandError>;

/// Failure of a single raw command on the storage protocol channel.
///
/// Timeouts are owned by the command issuer and reported here like any other
/// rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The card did not answer (or stayed busy) past the issuer's deadline.
    Timeout,
    /// The card answered with an error status (R1 card status bits).
    Rejected(u32),
    /// Address argument outside of the card's capacity.
    OutOfRange,
    /// Command received out of the erase ordering (CMD32 → CMD33 → CMD38).
    EraseSequence,
    /// Transport-level failure below the command layer.
    IO(BlockIOError),
}

impl CommandError {
    pub fn msg(&self) -> &'static str {
        match self {
            CommandError::Timeout => "Command timed out",
            CommandError::Rejected(_) => "Command rejected by card",
            CommandError::OutOfRange => "Address out of range",
            CommandError::EraseSequence => "Erase sequence error",
            CommandError::IO(_) => "IO error",
        }
    }

    pub fn source(&self) -> Option<BlockIOError> {
        match self {
            CommandError::IO(e) => Some(*e),
            _ => None,
        }
    }
}

impl From<BlockIOError> for CommandError {
    fn from(e: BlockIOError) -> Self {
        CommandError::IO(e)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let CommandError::Rejected(status) = self {
            write!(f, " (status: {status:#010x})")?;
        }
        if let Some(src) = self.source() {
            write!(f, "\n  caused by: {}", src.msg())?;
        }
        Ok(())
    }
}
