// SPDX-License-Identifier: MIT

use core::fmt;

pub use flashio::errors::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsAllocatorError {
    IO(BlockIOError),
    OutOfBlocks,
    /// Enough free clusters exist but no single run is long enough.
    NoContiguousRun,
    /// A chain that was expected to be one run is not.
    Fragmented,
    Other(&'static str),
}

impl FsAllocatorError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsAllocatorError::IO(_) => "IO error",
            FsAllocatorError::OutOfBlocks => "Out of blocks",
            FsAllocatorError::NoContiguousRun => "No contiguous run large enough",
            FsAllocatorError::Fragmented => "Cluster chain is fragmented",
            FsAllocatorError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsAllocatorError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FsAllocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        let mut current = self.source();
        while let Some(src) = current {
            write!(f, "\n  caused by: {}", src.msg())?;
            current = src.source();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsChainError {
    IO(BlockIOError),
    InvalidCluster(u32),
    LoopDetected,
    Other(&'static str),
}

impl FsChainError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsChainError::IO(_) => "IO error",
            FsChainError::InvalidCluster(_) => "Invalid cluster in FAT chain",
            FsChainError::LoopDetected => "Loop detected in FAT chain",
            FsChainError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsChainError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FsChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let FsChainError::InvalidCluster(cluster) = self {
            write!(f, " (cluster: {cluster})")?;
        }
        let mut current = self.source();
        while let Some(src) = current {
            write!(f, "\n  caused by: {}", src.msg())?;
            current = src.source();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsFormatterError {
    IO(BlockIOError),
    Invalid(&'static str),
    Other(&'static str),
}

impl FsFormatterError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsFormatterError::IO(_) => "IO error",
            FsFormatterError::Invalid(msg) => msg,
            FsFormatterError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsFormatterError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FsFormatterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        let mut current = self.source();
        while let Some(src) = current {
            write!(f, "\n  caused by: {}", src.msg())?;
            current = src.source();
        }
        Ok(())
    }
}

/// Errors of a mounted volume: paths, handles, and file operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsVolumeError {
    IO(BlockIOError),
    Allocator(FsAllocatorError),
    Chain(FsChainError),
    NotMounted,
    NotFound,
    AlreadyExists,
    AlreadyOpen,
    InvalidHandle,
    NotAFile,
    NotADirectory,
    InvalidName,
    ReadOnly,
    /// Operation refused in the file's current state (e.g. expanding a non-empty file).
    Denied,
    InvalidOffset,
    TooLarge,
    Corrupted(&'static str),
    Invalid(&'static str),
    Other(&'static str),
}

impl FsVolumeError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsVolumeError::IO(_) => "IO error",
            FsVolumeError::Allocator(_) => "Allocator error",
            FsVolumeError::Chain(_) => "Cluster chain error",
            FsVolumeError::NotMounted => "Volume not mounted",
            FsVolumeError::NotFound => "Path not found",
            FsVolumeError::AlreadyExists => "Entry already exists",
            FsVolumeError::AlreadyOpen => "File already open",
            FsVolumeError::InvalidHandle => "Invalid file handle",
            FsVolumeError::NotAFile => "Not a file",
            FsVolumeError::NotADirectory => "Not a directory",
            FsVolumeError::InvalidName => "Invalid 8.3 name",
            FsVolumeError::ReadOnly => "File not opened for writing",
            FsVolumeError::Denied => "Access denied",
            FsVolumeError::InvalidOffset => "Offset past end of file",
            FsVolumeError::TooLarge => "File size limit exceeded",
            FsVolumeError::Corrupted(msg) => msg,
            FsVolumeError::Invalid(msg) => msg,
            FsVolumeError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsVolumeError::IO(e) => Some(FsError::IO(*e)),
            FsVolumeError::Allocator(e) => Some(FsError::Allocator(*e)),
            FsVolumeError::Chain(e) => Some(FsError::Chain(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FsVolumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        let mut current = self.source();
        while let Some(src) = current {
            write!(f, "\n  caused by: {}", src.msg())?;
            current = src.source();
        }
        Ok(())
    }
}

/// Top-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    IO(BlockIOError),
    Allocator(FsAllocatorError),
    Chain(FsChainError),
    Formatter(FsFormatterError),
    Volume(FsVolumeError),
    Other(&'static str),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        let mut current = self.source();
        while let Some(src) = current {
            write!(f, "\n  caused by: {}", src.msg())?;
            current = src.source();
        }
        Ok(())
    }
}

impl FsError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsError::IO(e) => e.msg(),
            FsError::Allocator(e) => e.msg(),
            FsError::Chain(e) => e.msg(),
            FsError::Formatter(e) => e.msg(),
            FsError::Volume(e) => e.msg(),
            FsError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsError::Allocator(e) => e.source(),
            FsError::Chain(e) => e.source(),
            FsError::Formatter(e) => e.source(),
            FsError::Volume(e) => e.source(),
            FsError::IO(_) => None,
            FsError::Other(_) => None,
        }
    }

    /// `true` when the operation failed only because nothing is mounted.
    pub fn is_not_mounted(&self) -> bool {
        matches!(self, FsError::Volume(FsVolumeError::NotMounted))
    }
}

// === type Fs*Result ===

pub type FsResult<T = ()> = Result<T, FsError>;
pub type FsAllocatorResult<T = ()> = Result<T, FsAllocatorError>;
pub type FsChainResult<T = ()> = Result<T, FsChainError>;
pub type FsFormatterResult<T = ()> = Result<T, FsFormatterError>;
pub type FsVolumeResult<T = ()> = Result<T, FsVolumeError>;

crate::fs_error_wiring! {
    top => FsError {
        BlockIOError     : IO,
        FsAllocatorError : Allocator,
        FsChainError     : Chain,
        FsFormatterError : Formatter,
        FsVolumeError    : Volume,
    },
    str_into => [
        FsAllocatorError,
        FsChainError,
        FsFormatterError,
        FsVolumeError,
    ],
    sub => {
        BlockIOError     => [ FsAllocatorError::IO, FsChainError::IO, FsFormatterError::IO, FsVolumeError::IO ],
        FsAllocatorError => [ FsVolumeError::Allocator ],
        FsChainError     => [ FsVolumeError::Chain ],
    },
}
