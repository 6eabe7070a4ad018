// SPDX-License-Identifier: MIT

use time::PrimitiveDateTime;

use crate::{
    core::{errors::*, utils::time_utils},
    fs::fat32::constant::*,
};

/// Encodes a timestamp as FAT (date, time, tenths-of-second-fine) fields.
///
/// Years outside 1980..=2107 are clamped to the representable range.
pub fn datetime_from(ts: PrimitiveDateTime) -> (u16, u16, u8) {
    let year = ts.year().clamp(1980, 2107);
    let (month, day) = if ts.year() < 1980 {
        (1, 1)
    } else if ts.year() > 2107 {
        (12, 31)
    } else {
        (ts.month() as u16, ts.day() as u16)
    };

    let hour = ts.hour() as u16;
    let minute = ts.minute() as u16;
    let second = ts.second() as u16;

    // 10 ms units on top of the 2 s resolution of `time`.
    let fine = (second % 2) * 100 + ts.millisecond() / 10;

    let date = (((year - 1980) as u16) << 9) | (month << 5) | day;
    let time = (hour << 11) | (minute << 5) | (second / 2);

    (date, time, fine as u8)
}

pub fn datetime_now() -> (u16, u16, u8) {
    datetime_from(time_utils::now_timestamp())
}

/// Allowed characters in SFN (after uppercase):
/// A–Z, 0–9 and !$%'-_@~`^#&(){}.
#[inline(always)]
fn is_valid_sfn_char(b: u8) -> bool {
    matches!(b,
        b'A'..=b'Z' | b'0'..=b'9' |
        b'!' | b'$' | b'%' | b'\'' | b'-' | b'_' | b'@' | b'~' | b'`' |
        b'^' | b'#' | b'&' | b'(' | b')' | b'{' | b'}'
    )
}

/// Suggest a short 8.3 name from input, return (short_name, needs_lfn)
pub fn to_short_name(name: &str) -> ([u8; 11], bool) {
    let mut raw = [b' '; 11];

    let (base, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let base_bytes = base.as_bytes();
    let ext_bytes = ext.as_bytes();

    let too_long = base_bytes.len() > 8 || ext_bytes.len() > 3;

    let mut chars_ok = name.is_ascii();
    for (i, ch) in base_bytes.iter().take(8).enumerate() {
        let up = ch.to_ascii_uppercase();
        raw[i] = if is_valid_sfn_char(up) {
            up
        } else {
            chars_ok = false;
            b'_'
        };
    }
    for (i, ch) in ext_bytes.iter().take(3).enumerate() {
        let up = ch.to_ascii_uppercase();
        raw[8 + i] = if is_valid_sfn_char(up) {
            up
        } else {
            chars_ok = false;
            b'_'
        };
    }

    let empty_base = base_bytes.is_empty();
    let needs_lfn = too_long || !chars_ok || empty_base;

    if raw[0] == FAT_ENTRY_DELETED {
        raw[0] = FAT_ENTRY_KANJI_E5;
    }

    (raw, needs_lfn)
}

/// Strict 8.3 conversion: names that would need a long-name entry are refused.
pub fn short_name(name: &str) -> FsVolumeResult<[u8; 11]> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsVolumeError::InvalidName);
    }
    match to_short_name(name) {
        (raw, false) => Ok(raw),
        (_, true) => Err(FsVolumeError::InvalidName),
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_short_names() {
        assert_eq!(short_name("rec0001.wav").unwrap(), *b"REC0001 WAV");
        assert_eq!(short_name("LOG").unwrap(), *b"LOG        ");
        assert_eq!(short_name("a.b").unwrap(), *b"A       B  ");

        assert_eq!(short_name("recording.wav"), Err(FsVolumeError::InvalidName));
        assert_eq!(short_name("a.wave"), Err(FsVolumeError::InvalidName));
        assert_eq!(short_name("has space"), Err(FsVolumeError::InvalidName));
        assert_eq!(short_name("caf\u{e9}.txt"), Err(FsVolumeError::InvalidName));
        assert_eq!(short_name(".hidden"), Err(FsVolumeError::InvalidName));
        assert_eq!(short_name(".."), Err(FsVolumeError::InvalidName));
    }

    #[test]
    fn test_datetime_encoding() {
        let (date, time, fine) = datetime_from(datetime!(2024-03-15 13:45:31.250));
        assert_eq!(date, ((2024 - 1980) << 9) | (3 << 5) | 15);
        assert_eq!(time, (13 << 11) | (45 << 5) | 15);
        assert_eq!(fine, 125);
    }

    #[test]
    fn test_datetime_clamps_to_fat_epoch() {
        let (date, time, _) = datetime_from(datetime!(1970-01-01 00:00));
        assert_eq!(date, (1 << 5) | 1);
        assert_eq!(time, 0);
    }
}
