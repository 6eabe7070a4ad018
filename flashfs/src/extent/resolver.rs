// SPDX-License-Identifier: MIT

use crate::{
    core::{Lba, VolumeGeometry, fat::FIRST_DATA_CLUSTER},
    extent::{errors::*, range::SectorRange},
};

/// Absolute sector holding the first byte of `first_cluster`.
///
/// `data_region_base + (first_cluster - 2) * sectors_per_cluster`, with
/// every constant taken from the mounted volume.
pub fn resolve_first_sector(geometry: &VolumeGeometry, first_cluster: u32) -> ExtentResult<Lba> {
    if geometry.sectors_per_cluster == 0 {
        return Err(ExtentError::InvalidVolumeState("zero sectors per cluster"));
    }
    if first_cluster < FIRST_DATA_CLUSTER {
        return Err(ExtentError::InvalidAllocation(first_cluster));
    }

    (first_cluster - FIRST_DATA_CLUSTER)
        .checked_mul(geometry.sectors_per_cluster)
        .and_then(|offset| geometry.data_region_base.checked_add(offset))
        .ok_or(ExtentError::InvalidAllocation(first_cluster))
}

/// Sectors covering `total_bytes` from the start of `first_cluster`.
pub fn resolve_extent(
    geometry: &VolumeGeometry,
    first_cluster: u32,
    total_bytes: u64,
) -> ExtentResult<SectorRange> {
    let start = resolve_first_sector(geometry, first_cluster)?;
    let bps = geometry.bytes_per_sector as u64;
    if bps == 0 {
        return Err(ExtentError::InvalidVolumeState("zero bytes per sector"));
    }
    let sectors = u32::try_from(total_bytes.div_ceil(bps))
        .map_err(|_| ExtentError::InvalidAllocation(first_cluster))?;
    SectorRange::from_len(start, sectors).ok_or(ExtentError::InvalidAllocation(first_cluster))
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    fn geometry(spc: u32, base: Lba) -> VolumeGeometry {
        VolumeGeometry {
            bytes_per_sector: 512,
            sectors_per_cluster: spc,
            data_region_base: base,
            cluster_count: 1 << 20,
        }
    }

    #[test]
    fn test_formula() {
        let g = geometry(8, 2048);
        assert_eq!(resolve_first_sector(&g, 2), Ok(2048));
        assert_eq!(resolve_first_sector(&g, 10), Ok(2112));
        assert_eq!(resolve_first_sector(&geometry(64, 0), 3), Ok(64));
    }

    #[test]
    fn test_reserved_clusters_rejected() {
        let g = geometry(8, 2048);
        assert_eq!(resolve_first_sector(&g, 0), Err(ExtentError::InvalidAllocation(0)));
        assert_eq!(resolve_first_sector(&g, 1), Err(ExtentError::InvalidAllocation(1)));
    }

    #[test]
    fn test_zero_cluster_size_checked_first() {
        let g = geometry(0, 2048);
        for cluster in [0, 1, 2, 10] {
            assert!(matches!(
                resolve_first_sector(&g, cluster),
                Err(ExtentError::InvalidVolumeState(_))
            ));
        }
    }

    #[test]
    fn test_overflow_is_invalid_allocation() {
        let g = geometry(128, u32::MAX - 10);
        assert_eq!(resolve_first_sector(&g, 3), Err(ExtentError::InvalidAllocation(3)));
        let g = geometry(64, 0);
        assert_eq!(
            resolve_first_sector(&g, u32::MAX),
            Err(ExtentError::InvalidAllocation(u32::MAX))
        );
    }

    #[test]
    fn test_extent_rounds_up_to_sectors() {
        let g = geometry(8, 2048);
        assert_eq!(resolve_extent(&g, 10, 4096), Ok(SectorRange::new(2112, 2119).unwrap()));
        assert_eq!(resolve_extent(&g, 10, 4097), Ok(SectorRange::new(2112, 2120).unwrap()));
        assert!(resolve_extent(&g, 10, 0).is_err());
    }
}
