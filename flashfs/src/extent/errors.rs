// SPDX-License-Identifier: MIT

use core::fmt;

use flashio::errors::CommandError;

use crate::core::{Lba, errors::FsError};
use crate::extent::erase::EraseStage;

/// Failure of extent preparation or of the raw capture that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentError {
    VolumeNotMounted,
    /// Rejected before touching the filesystem.
    InvalidRequest(&'static str),
    OpenFailed(FsError),
    AllocationFailed(FsError),
    /// The header went out short (`written < expected`) or the write failed (`cause`).
    HeaderWriteFailed {
        written: usize,
        expected: usize,
        cause: Option<FsError>,
    },
    SyncFailed(FsError),
    /// Cluster number that cannot start a data extent.
    InvalidAllocation(u32),
    InvalidVolumeState(&'static str),
    EraseCommandRejected {
        stage: EraseStage,
        cause: CommandError,
    },
    /// Raw writes take whole sectors only; carries the offending length.
    UnalignedWrite(usize),
    ExtentExhausted {
        requested: u64,
        remaining: u64,
    },
    RawWriteFailed {
        lba: Lba,
        cause: CommandError,
    },
    CloseFailed(FsError),
}

impl ExtentError {
    pub fn msg(&self) -> &'static str {
        match self {
            ExtentError::VolumeNotMounted => "Volume not mounted",
            ExtentError::InvalidRequest(msg) => msg,
            ExtentError::OpenFailed(_) => "Failed to open file",
            ExtentError::AllocationFailed(_) => "Contiguous allocation failed",
            ExtentError::HeaderWriteFailed { .. } => "Header write failed",
            ExtentError::SyncFailed(_) => "Failed to sync file metadata",
            ExtentError::InvalidAllocation(_) => "Invalid first cluster",
            ExtentError::InvalidVolumeState(msg) => msg,
            ExtentError::EraseCommandRejected { .. } => "Erase command rejected",
            ExtentError::UnalignedWrite(_) => "Write is not a whole number of sectors",
            ExtentError::ExtentExhausted { .. } => "Write runs past the end of the extent",
            ExtentError::RawWriteFailed { .. } => "Raw block write failed",
            ExtentError::CloseFailed(_) => "Failed to close file",
        }
    }

    /// Filesystem error underneath, if any.
    pub fn source(&self) -> Option<FsError> {
        match self {
            ExtentError::OpenFailed(e)
            | ExtentError::AllocationFailed(e)
            | ExtentError::SyncFailed(e)
            | ExtentError::CloseFailed(e) => Some(*e),
            ExtentError::HeaderWriteFailed { cause, .. } => *cause,
            _ => None,
        }
    }

    /// Command error underneath, if any.
    pub fn command_error(&self) -> Option<CommandError> {
        match self {
            ExtentError::EraseCommandRejected { cause, .. }
            | ExtentError::RawWriteFailed { cause, .. } => Some(*cause),
            _ => None,
        }
    }
}

impl fmt::Display for ExtentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        match self {
            ExtentError::HeaderWriteFailed {
                written, expected, ..
            } => write!(f, " ({written} of {expected} bytes)")?,
            ExtentError::InvalidAllocation(cluster) => write!(f, " (cluster: {cluster})")?,
            ExtentError::EraseCommandRejected { stage, .. } => write!(f, " at {stage}")?,
            ExtentError::UnalignedWrite(len) => write!(f, " (len: {len})")?,
            ExtentError::ExtentExhausted {
                requested,
                remaining,
            } => write!(f, " ({requested} bytes requested, {remaining} left)")?,
            ExtentError::RawWriteFailed { lba, .. } => write!(f, " at sector {lba}")?,
            _ => {}
        }

        if let Some(cmd) = self.command_error() {
            write!(f, "\n  caused by: {cmd}")?;
        }
        let mut current = self.source();
        while let Some(src) = current {
            write!(f, "\n  caused by: {}", src.msg())?;
            current = src.source();
        }
        Ok(())
    }
}

pub type ExtentResult<T = ()> = Result<T, ExtentError>;
