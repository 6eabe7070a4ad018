// SPDX-License-Identifier: MIT

/// Generates `read_le_<ty>` / `write_le_<ty>` for on-disk integer fields.
///
/// FAT entries, FSInfo counters and BPB fields are all little-endian.
#[macro_export]
macro_rules! le_field_rw {
    ($($ty:ident),+ $(,)?) => {
        $(
            paste::paste! {
                #[doc = "Reads a little-endian `" $ty "` at `offset`."]
                #[inline]
                fn [<read_le_ $ty>](&mut self, offset: u64) -> BlockIOResult<$ty> {
                    let mut raw = [0u8; ::core::mem::size_of::<$ty>()];
                    self.read_at(offset, &mut raw)?;
                    Ok(<$ty>::from_le_bytes(raw))
                }

                #[doc = "Writes `value` as a little-endian `" $ty "` at `offset`."]
                #[inline]
                fn [<write_le_ $ty>](&mut self, offset: u64, value: $ty) -> BlockIOResult {
                    self.write_at(offset, &value.to_le_bytes())
                }
            }
        )+
    };
}
