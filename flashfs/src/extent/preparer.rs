// SPDX-License-Identifier: MIT

//! Pre-allocation, header write, resolution and pre-erase of a capture file.

use core::fmt;

use flashio::command::CommandIssuer;

use crate::{
    core::{
        FileMode, Lba, VolumeGeometry,
        errors::{FsAllocatorError, FsError},
        extent_fs::ExtentFs,
    },
    extent::{
        erase::erase_sectors, errors::*, range::SectorRange, resolver::resolve_first_sector,
        writer::ExtentWriter,
    },
};

/// Stage of the preparation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrepStage {
    Open,
    Allocate,
    WriteHeader,
    Resolve,
    Erase,
}

impl fmt::Display for PrepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrepStage::Open => "open",
            PrepStage::Allocate => "allocate",
            PrepStage::WriteHeader => "write header",
            PrepStage::Resolve => "resolve",
            PrepStage::Erase => "erase",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepState {
    Unopened,
    Opened,
    Allocated,
    HeaderWritten,
    Resolved,
    Erased,
    ReadyForRawWrite,
    Failed(PrepStage),
}

/// What to prepare.
#[derive(Debug, Clone, Copy)]
pub struct ExtentRequest<'a> {
    pub path: &'a str,
    pub mode: FileMode,
    /// Final file size, header included.
    pub total_length_bytes: u64,
    /// Written through the filesystem at offset 0; whole sectors only.
    pub header: &'a [u8],
}

impl<'a> ExtentRequest<'a> {
    /// Request with [`FileMode::Write`] (create or truncate).
    pub fn new(path: &'a str, total_length_bytes: u64, header: &'a [u8]) -> Self {
        Self {
            path,
            mode: FileMode::Write,
            total_length_bytes,
            header,
        }
    }

    pub fn with_mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }
}

/// A failed preparation.
///
/// `file` is still open when the failure happened after a successful open;
/// nothing is rolled back and closing it is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepFailure<H> {
    pub stage: PrepStage,
    pub error: ExtentError,
    pub file: Option<H>,
}

impl<H> fmt::Display for PrepFailure<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extent preparation failed at {}: {}", self.stage, self.error)
    }
}

/// An open file whose data lives in one known, pre-erased sector extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileExtentHandle<H> {
    file: H,
    first_cluster: u32,
    extent: SectorRange,
    writable: SectorRange,
    header_sectors: u32,
    bytes_per_sector: u16,
    total_length_bytes: u64,
}

impl<H: Copy> FileExtentHandle<H> {
    #[inline]
    pub fn file(&self) -> H {
        self.file
    }

    #[inline]
    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    /// First sector of the file (where the header starts).
    #[inline]
    pub fn start_sector(&self) -> Lba {
        self.extent.start()
    }

    /// Every sector of the file, header included.
    #[inline]
    pub fn extent(&self) -> SectorRange {
        self.extent
    }

    /// Sectors past the header; the pre-erased part.
    #[inline]
    pub fn writable_range(&self) -> SectorRange {
        self.writable
    }

    /// `None` for a file without header.
    pub fn header_range(&self) -> Option<SectorRange> {
        self.extent.take(self.header_sectors)
    }

    #[inline]
    pub fn header_sectors(&self) -> u32 {
        self.header_sectors
    }

    #[inline]
    pub fn bytes_per_sector(&self) -> u16 {
        self.bytes_per_sector
    }

    #[inline]
    pub fn total_length_bytes(&self) -> u64 {
        self.total_length_bytes
    }

    /// Raw writer positioned at the start of the writable range.
    pub fn writer(&self) -> ExtentWriter {
        ExtentWriter::new(self.writable, self.bytes_per_sector)
    }

    #[inline]
    fn header_range_bytes(&self) -> u64 {
        self.header_sectors as u64 * self.bytes_per_sector as u64
    }

    /// File length covering the header plus what `writer` has captured.
    pub fn captured_len(&self, writer: &ExtentWriter) -> u64 {
        self.header_range_bytes() + writer.bytes_written()
    }

    /// Closes the file, first shrinking it to `final_len` when one is given.
    ///
    /// The close is attempted even when shrinking fails; the first error wins.
    pub fn close<F>(self, fs: &mut F, final_len: Option<u64>) -> ExtentResult
    where
        F: ExtentFs<File = H> + ?Sized,
    {
        let shrink = match final_len {
            Some(len) if len > self.total_length_bytes => {
                Err(ExtentError::InvalidRequest("final length exceeds the reserved extent"))
            }
            Some(len) if len < self.header_range_bytes() => {
                Err(ExtentError::InvalidRequest("final length cuts into the header"))
            }
            Some(len) if len < self.total_length_bytes => fs
                .set_len(self.file, len)
                .map_err(ExtentError::CloseFailed),
            _ => Ok(()),
        };
        let closed = fs.close(self.file).map_err(ExtentError::CloseFailed);
        log::debug!("extent: closed file at sector {}", self.extent.start());
        shrink.and(closed)
    }
}

/// Drives one preparation stage at a time.
///
/// [`prepare_extent`] runs every stage in order; callers that need to act
/// between stages can drive the preparer themselves.
#[derive(Debug)]
pub struct ExtentPreparer<'r, 'a, H> {
    request: &'r ExtentRequest<'a>,
    state: PrepState,
    bytes_per_sector: u16,
    header_sectors: u32,
    total_sectors: u32,
    file: Option<H>,
    first_cluster: u32,
    writable: Option<SectorRange>,
    extent: Option<SectorRange>,
}

fn volume_error(e: FsError, otherwise: fn(FsError) -> ExtentError) -> ExtentError {
    if e.is_not_mounted() {
        ExtentError::VolumeNotMounted
    } else {
        otherwise(e)
    }
}

fn read_geometry<F: ExtentFs + ?Sized>(fs: &F) -> ExtentResult<VolumeGeometry> {
    if !fs.is_mounted() {
        return Err(ExtentError::VolumeNotMounted);
    }
    fs.geometry().map_err(|e| {
        volume_error(e, |_| ExtentError::InvalidVolumeState("volume geometry unavailable"))
    })
}

impl<'r, 'a, H: Copy + Eq + fmt::Debug> ExtentPreparer<'r, 'a, H> {
    /// Validates `request` against the mounted volume's sector size.
    ///
    /// Only reads the volume geometry; nothing is opened or written.
    pub fn new<F>(fs: &F, request: &'r ExtentRequest<'a>) -> ExtentResult<Self>
    where
        F: ExtentFs<File = H> + ?Sized,
    {
        if request.total_length_bytes == 0 {
            return Err(ExtentError::InvalidRequest("total length is zero"));
        }
        if request.header.len() as u64 > request.total_length_bytes {
            return Err(ExtentError::InvalidRequest("header longer than the file"));
        }

        let geometry = read_geometry(fs)?;
        let bps = geometry.bytes_per_sector as u64;
        if bps == 0 {
            return Err(ExtentError::InvalidVolumeState("zero bytes per sector"));
        }
        if !(request.header.len() as u64).is_multiple_of(bps) {
            return Err(ExtentError::InvalidRequest(
                "header is not a whole number of sectors",
            ));
        }

        let header_sectors = (request.header.len() as u64 / bps) as u32;
        let total_sectors = u32::try_from(request.total_length_bytes.div_ceil(bps))
            .map_err(|_| ExtentError::InvalidRequest("extent exceeds the sector address space"))?;
        if header_sectors >= total_sectors {
            return Err(ExtentError::InvalidRequest("header leaves no writable sector"));
        }

        Ok(Self {
            request,
            state: PrepState::Unopened,
            bytes_per_sector: geometry.bytes_per_sector,
            header_sectors,
            total_sectors,
            file: None,
            first_cluster: 0,
            writable: None,
            extent: None,
        })
    }

    #[inline]
    pub fn state(&self) -> PrepState {
        self.state
    }

    #[inline]
    pub fn file(&self) -> Option<H> {
        self.file
    }

    /// Writable range, once resolved.
    #[inline]
    pub fn writable_range(&self) -> Option<SectorRange> {
        self.writable
    }

    /// Failure report for `error` at the current stage.
    pub fn failure(&self, error: ExtentError) -> PrepFailure<H> {
        let stage = match self.state {
            PrepState::Failed(stage) => stage,
            PrepState::Unopened => PrepStage::Open,
            PrepState::Opened => PrepStage::Allocate,
            PrepState::Allocated => PrepStage::WriteHeader,
            PrepState::HeaderWritten => PrepStage::Resolve,
            PrepState::Resolved | PrepState::Erased | PrepState::ReadyForRawWrite => {
                PrepStage::Erase
            }
        };
        PrepFailure {
            stage,
            error,
            file: self.file,
        }
    }

    fn enter(&mut self, expected: PrepState, stage: PrepStage) -> ExtentResult {
        if self.state != expected {
            return Err(ExtentError::InvalidVolumeState("preparation stage out of order"));
        }
        log::debug!("extent: {} ({})", stage, self.request.path);
        Ok(())
    }

    fn settle<T>(&mut self, stage: PrepStage, next: PrepState, res: ExtentResult<T>) -> ExtentResult<T> {
        self.state = match res {
            Ok(_) => next,
            Err(_) => PrepState::Failed(stage),
        };
        res
    }

    fn opened_file(&self) -> ExtentResult<H> {
        self.file
            .ok_or(ExtentError::InvalidVolumeState("no open file"))
    }

    pub fn open<F>(&mut self, fs: &mut F) -> ExtentResult
    where
        F: ExtentFs<File = H> + ?Sized,
    {
        self.enter(PrepState::Unopened, PrepStage::Open)?;
        let res = if !fs.is_mounted() {
            Err(ExtentError::VolumeNotMounted)
        } else {
            fs.open(self.request.path, self.request.mode)
                .map_err(|e| volume_error(e, ExtentError::OpenFailed))
        };
        let file = self.settle(PrepStage::Open, PrepState::Opened, res)?;
        self.file = Some(file);
        Ok(())
    }

    /// Reserves the whole length as one run and checks the chain really is one.
    pub fn allocate<F>(&mut self, fs: &mut F) -> ExtentResult
    where
        F: ExtentFs<File = H> + ?Sized,
    {
        self.enter(PrepState::Opened, PrepStage::Allocate)?;
        let res = self.opened_file().and_then(|file| {
            fs.allocate_contiguous(file, self.request.total_length_bytes)
                .map_err(ExtentError::AllocationFailed)?;
            let contiguous = fs
                .is_contiguous(file)
                .map_err(ExtentError::AllocationFailed)?;
            if !contiguous {
                log::warn!(
                    "extent: allocation for {} is fragmented",
                    self.request.path
                );
                return Err(ExtentError::AllocationFailed(FsError::Allocator(
                    FsAllocatorError::Fragmented,
                )));
            }
            Ok(())
        });
        self.settle(PrepStage::Allocate, PrepState::Allocated, res)
    }

    pub fn write_header<F>(&mut self, fs: &mut F) -> ExtentResult
    where
        F: ExtentFs<File = H> + ?Sized,
    {
        self.enter(PrepState::Allocated, PrepStage::WriteHeader)?;
        let header = self.request.header;
        let res = self.opened_file().and_then(|file| {
            if header.is_empty() {
                return Ok(());
            }
            match fs.write(file, header) {
                Ok(n) if n == header.len() => Ok(()),
                Ok(n) => Err(ExtentError::HeaderWriteFailed {
                    written: n,
                    expected: header.len(),
                    cause: None,
                }),
                Err(e) => Err(ExtentError::HeaderWriteFailed {
                    written: 0,
                    expected: header.len(),
                    cause: Some(e),
                }),
            }
        });
        self.settle(PrepStage::WriteHeader, PrepState::HeaderWritten, res)
    }

    /// Commits metadata, then turns the first cluster into the sector extent.
    ///
    /// Leaves the file positioned right after the header.
    pub fn resolve<F>(&mut self, fs: &mut F) -> ExtentResult
    where
        F: ExtentFs<File = H> + ?Sized,
    {
        self.enter(PrepState::HeaderWritten, PrepStage::Resolve)?;
        let res = self.opened_file().and_then(|file| {
            fs.flush(file).map_err(ExtentError::SyncFailed)?;
            fs.seek(file, 0).map_err(ExtentError::SyncFailed)?;

            let geometry = read_geometry(fs)?;
            if geometry.bytes_per_sector != self.bytes_per_sector {
                return Err(ExtentError::InvalidVolumeState("sector size changed"));
            }
            let first_cluster = fs.first_cluster(file).map_err(ExtentError::SyncFailed)?;
            let start = resolve_first_sector(&geometry, first_cluster)?;

            let extent = SectorRange::from_len(start, self.total_sectors)
                .ok_or(ExtentError::InvalidAllocation(first_cluster))?;
            let data_end = geometry.data_region_base as u64
                + geometry.cluster_count as u64 * geometry.sectors_per_cluster as u64;
            if extent.end() as u64 >= data_end {
                return Err(ExtentError::InvalidAllocation(first_cluster));
            }
            let writable = extent
                .skip(self.header_sectors)
                .ok_or(ExtentError::InvalidAllocation(first_cluster))?;

            fs.seek(file, self.request.header.len() as u64)
                .map_err(ExtentError::SyncFailed)?;
            Ok((first_cluster, extent, writable))
        });

        let (first_cluster, extent, writable) =
            self.settle(PrepStage::Resolve, PrepState::Resolved, res)?;
        self.first_cluster = first_cluster;
        self.extent = Some(extent);
        self.writable = Some(writable);
        Ok(())
    }

    /// Pre-erases the writable range; the header sectors are left alone.
    pub fn erase<C: CommandIssuer + ?Sized>(&mut self, card: &mut C) -> ExtentResult<SectorRange> {
        self.enter(PrepState::Resolved, PrepStage::Erase)?;
        let res = self
            .writable
            .ok_or(ExtentError::InvalidVolumeState("extent not resolved"))
            .and_then(|range| erase_sectors(card, range));
        self.settle(PrepStage::Erase, PrepState::Erased, res)
    }

    /// Hands out the prepared file.
    pub fn finish(&mut self) -> ExtentResult<(FileExtentHandle<H>, SectorRange)> {
        if self.state != PrepState::Erased {
            return Err(ExtentError::InvalidVolumeState("extent not erased"));
        }
        let (Some(file), Some(extent), Some(writable)) = (self.file, self.extent, self.writable)
        else {
            return Err(ExtentError::InvalidVolumeState("extent not resolved"));
        };
        self.state = PrepState::ReadyForRawWrite;

        let handle = FileExtentHandle {
            file,
            first_cluster: self.first_cluster,
            extent,
            writable,
            header_sectors: self.header_sectors,
            bytes_per_sector: self.bytes_per_sector,
            total_length_bytes: self.request.total_length_bytes,
        };
        Ok((handle, writable))
    }
}

fn run_stages<F, C>(
    prep: &mut ExtentPreparer<'_, '_, F::File>,
    fs: &mut F,
    card: &mut C,
) -> ExtentResult<(FileExtentHandle<F::File>, SectorRange)>
where
    F: ExtentFs + ?Sized,
    C: CommandIssuer + ?Sized,
{
    prep.open(fs)?;
    prep.allocate(fs)?;
    prep.write_header(fs)?;
    prep.resolve(fs)?;
    prep.erase(card)?;
    prep.finish()
}

/// Opens, reserves, writes the header, resolves and pre-erases a capture file.
///
/// On success the file is open, positioned after the header, and every
/// sector of the returned range is erased and ready for raw writes.
/// `fs` and `card` are borrowed exclusively for the whole call.
pub fn prepare_extent<F, C>(
    fs: &mut F,
    card: &mut C,
    request: &ExtentRequest<'_>,
) -> Result<(FileExtentHandle<F::File>, SectorRange), PrepFailure<F::File>>
where
    F: ExtentFs + ?Sized,
    C: CommandIssuer + ?Sized,
{
    let mut prep = ExtentPreparer::new(&*fs, request).map_err(|error| PrepFailure {
        stage: PrepStage::Open,
        error,
        file: None,
    })?;

    let (handle, range) = run_stages(&mut prep, fs, card).map_err(|error| {
        let failure = prep.failure(error);
        log::debug!("extent: {failure}");
        failure
    })?;
    log::debug!(
        "extent: {} ready, cluster {} -> writable {}",
        request.path,
        handle.first_cluster(),
        range
    );
    Ok((handle, range))
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::core::errors::FsResult;
    use core::cell::Cell;

    /// Volume that only answers geometry queries and counts everything else.
    struct GeometryOnly {
        mounted: bool,
        calls: Cell<usize>,
    }

    impl GeometryOnly {
        fn new(mounted: bool) -> Self {
            Self {
                mounted,
                calls: Cell::new(0),
            }
        }

        fn touched<T>(&self) -> FsResult<T> {
            self.calls.set(self.calls.get() + 1);
            Err(FsError::Other("unexpected call"))
        }
    }

    impl ExtentFs for GeometryOnly {
        type File = u8;

        fn is_mounted(&self) -> bool {
            self.mounted
        }

        fn geometry(&self) -> FsResult<VolumeGeometry> {
            Ok(VolumeGeometry {
                bytes_per_sector: 512,
                sectors_per_cluster: 8,
                data_region_base: 2048,
                cluster_count: 1000,
            })
        }

        fn open(&mut self, _: &str, _: FileMode) -> FsResult<u8> {
            self.touched()
        }

        fn allocate_contiguous(&mut self, _: u8, _: u64) -> FsResult {
            self.touched()
        }

        fn is_contiguous(&mut self, _: u8) -> FsResult<bool> {
            self.touched()
        }

        fn write(&mut self, _: u8, _: &[u8]) -> FsResult<usize> {
            self.touched()
        }

        fn flush(&mut self, _: u8) -> FsResult {
            self.touched()
        }

        fn seek(&mut self, _: u8, _: u64) -> FsResult {
            self.touched()
        }

        fn first_cluster(&self, _: u8) -> FsResult<u32> {
            self.touched()
        }

        fn set_len(&mut self, _: u8, _: u64) -> FsResult {
            self.touched()
        }

        fn close(&mut self, _: u8) -> FsResult {
            self.touched()
        }
    }

    fn validate(fs: &GeometryOnly, total: u64, header: &[u8]) -> ExtentResult {
        let req = ExtentRequest::new("REC.WAV", total, header);
        ExtentPreparer::new(fs, &req).map(|_| ())
    }

    #[test]
    fn test_request_validation_touches_nothing() {
        let fs = GeometryOnly::new(true);
        let sector = [0u8; 512];

        assert!(matches!(validate(&fs, 0, &[]), Err(ExtentError::InvalidRequest(_))));
        assert!(matches!(
            validate(&fs, 4096, &sector[..100]),
            Err(ExtentError::InvalidRequest(_))
        ));
        // 512-byte header in a 512-byte file leaves nothing to erase.
        assert!(matches!(validate(&fs, 512, &sector), Err(ExtentError::InvalidRequest(_))));
        assert!(matches!(validate(&fs, 100, &sector), Err(ExtentError::InvalidRequest(_))));

        assert_eq!(validate(&fs, 513, &sector), Ok(()));
        assert_eq!(validate(&fs, 4096, &[]), Ok(()));
        assert_eq!(fs.calls.get(), 0);
    }

    #[test]
    fn test_unmounted_volume() {
        let fs = GeometryOnly::new(false);
        assert_eq!(validate(&fs, 4096, &[]), Err(ExtentError::VolumeNotMounted));
    }

    #[test]
    fn test_open_failure_reports_stage_without_file() {
        let mut fs = GeometryOnly::new(true);
        let mut card = NoCard;
        let req = ExtentRequest::new("REC.WAV", 4096, &[]);

        let failure = prepare_extent(&mut fs, &mut card, &req).unwrap_err();
        assert_eq!(failure.stage, PrepStage::Open);
        assert_eq!(failure.file, None);
        assert_eq!(
            failure.error,
            ExtentError::OpenFailed(FsError::Other("unexpected call"))
        );
    }

    #[test]
    fn test_stages_refuse_to_run_out_of_order() {
        let mut fs = GeometryOnly::new(true);
        let req = ExtentRequest::new("REC.WAV", 4096, &[]);
        let mut prep = ExtentPreparer::new(&fs, &req).unwrap();

        assert!(prep.allocate(&mut fs).is_err());
        assert!(prep.erase(&mut NoCard).is_err());
        assert!(prep.finish().is_err());
        assert_eq!(prep.state(), PrepState::Unopened);
        assert_eq!(fs.calls.get(), 0);
    }

    struct NoCard;

    impl CommandIssuer for NoCard {
        fn send_command(
            &mut self,
            _: flashio::command::SdCommand,
            _: u32,
        ) -> flashio::errors::CommandResult {
            Err(flashio::errors::CommandError::Timeout)
        }
    }
}
