//! Timestamp handling for item metadata.
//!
//! Every format stores times differently: NTFS and LZH extended headers use
//! Windows FILETIME, FAT and LZH level 0/1 headers use packed MS-DOS
//! date/time words, LZH level 2 headers use Unix seconds and NSIS stores a
//! FILETIME split in two 32-bit halves. [`Timestamp`] normalises all of them
//! to FILETIME precision (100-nanosecond intervals since 1601-01-01).
//!
//! # Example
//!
//! ```rust
//! use archkit::Timestamp;
//!
//! let ts = Timestamp::from_unix_secs(0).unwrap();
//! assert_eq!(ts.as_filetime(), 116444736000000000);
//!
//! // 2020-06-15 12:30:10 packed as MS-DOS date/time
//! let dos = Timestamp::from_dos_datetime(0x50CF, 0x63C5).unwrap();
//! assert_eq!(dos.as_unix_secs(), 1_592_224_210);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Difference between the FILETIME epoch (1601) and the Unix epoch (1970)
/// in 100-nanosecond intervals.
const FILETIME_UNIX_DIFF: u64 = 116444736000000000;

/// Number of 100-nanosecond intervals per second.
const INTERVALS_PER_SECOND: u64 = 10_000_000;

/// A point in time with FILETIME precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    filetime: u64,
}

impl Timestamp {
    /// Creates a timestamp from a raw Windows FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Creates a timestamp from a FILETIME stored as two 32-bit halves.
    ///
    /// Returns `None` for the all-zero and all-ones sentinels.
    pub fn from_filetime_parts(low: u32, high: u32) -> Option<Self> {
        let value = ((high as u64) << 32) | low as u64;
        if value == 0 || value == u64::MAX {
            None
        } else {
            Some(Self::from_filetime(value))
        }
    }

    /// Creates a timestamp from Unix seconds.
    ///
    /// Returns `None` if the value cannot be represented.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        let magnitude = secs.unsigned_abs().checked_mul(INTERVALS_PER_SECOND)?;
        if secs < 0 {
            FILETIME_UNIX_DIFF
                .checked_sub(magnitude)
                .map(Self::from_filetime)
        } else {
            FILETIME_UNIX_DIFF
                .checked_add(magnitude)
                .map(Self::from_filetime)
        }
    }

    /// Creates a timestamp from packed MS-DOS date and time words.
    ///
    /// The date word holds `day | month << 5 | (year - 1980) << 9`, the time
    /// word `seconds / 2 | minute << 5 | hour << 11`. DOS times carry no time
    /// zone; the value is interpreted as UTC. Returns `None` for a zero date
    /// or out-of-range fields.
    pub fn from_dos_datetime(date: u16, time: u16) -> Option<Self> {
        if date == 0 {
            return None;
        }
        let day = (date & 0x1F) as u32;
        let month = ((date >> 5) & 0x0F) as u32;
        let year = 1980 + (date >> 9) as i64;
        let second = ((time & 0x1F) * 2) as i64;
        let minute = ((time >> 5) & 0x3F) as i64;
        let hour = (time >> 11) as i64;
        if !(1..=12).contains(&month) || day == 0 || day > 31 {
            return None;
        }
        if hour > 23 || minute > 59 || second > 59 {
            return None;
        }
        let days = days_from_civil(year, month, day);
        Self::from_unix_secs(days * 86_400 + hour * 3_600 + minute * 60 + second)
    }

    /// Creates a timestamp from a packed MS-DOS date word (midnight).
    pub fn from_dos_date(date: u16) -> Option<Self> {
        Self::from_dos_datetime(date, 0)
    }

    /// Creates a timestamp from a `SystemTime`.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => {
                let base = Self::from_unix_secs(d.as_secs() as i64)?;
                base.filetime
                    .checked_add((d.subsec_nanos() / 100) as u64)
                    .map(Self::from_filetime)
            }
            Err(e) => Self::from_unix_secs(-(e.duration().as_secs() as i64)),
        }
    }

    /// Returns the raw Windows FILETIME value.
    #[inline]
    pub const fn as_filetime(&self) -> u64 {
        self.filetime
    }

    /// Returns whole Unix seconds (floor division for pre-1970 times).
    pub fn as_unix_secs(&self) -> i64 {
        if self.filetime >= FILETIME_UNIX_DIFF {
            ((self.filetime - FILETIME_UNIX_DIFF) / INTERVALS_PER_SECOND) as i64
        } else {
            let diff = FILETIME_UNIX_DIFF - self.filetime;
            -(diff.div_ceil(INTERVALS_PER_SECOND) as i64)
        }
    }

    /// Returns the sub-second part in nanoseconds.
    pub fn sub_second_nanos(&self) -> u32 {
        let rem = if self.filetime >= FILETIME_UNIX_DIFF {
            (self.filetime - FILETIME_UNIX_DIFF) % INTERVALS_PER_SECOND
        } else {
            let r = (FILETIME_UNIX_DIFF - self.filetime) % INTERVALS_PER_SECOND;
            if r == 0 { 0 } else { INTERVALS_PER_SECOND - r }
        };
        (rem * 100) as u32
    }

    /// Converts to `SystemTime`.
    pub fn as_system_time(&self) -> SystemTime {
        if self.filetime >= FILETIME_UNIX_DIFF {
            let intervals = self.filetime - FILETIME_UNIX_DIFF;
            UNIX_EPOCH
                + Duration::from_secs(intervals / INTERVALS_PER_SECOND)
                + Duration::from_nanos((intervals % INTERVALS_PER_SECOND) * 100)
        } else {
            let intervals = FILETIME_UNIX_DIFF - self.filetime;
            UNIX_EPOCH
                - Duration::from_secs(intervals / INTERVALS_PER_SECOND)
                - Duration::from_nanos((intervals % INTERVALS_PER_SECOND) * 100)
        }
    }

    /// Converts to a `filetime::FileTime` for applying to extracted files.
    pub fn as_file_time(&self) -> filetime::FileTime {
        filetime::FileTime::from_unix_time(self.as_unix_secs(), self.sub_second_nanos())
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> SystemTime {
        ts.as_system_time()
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        let ts = Timestamp::from_unix_secs(0).unwrap();
        assert_eq!(ts.as_filetime(), FILETIME_UNIX_DIFF);
        assert_eq!(ts.as_system_time(), UNIX_EPOCH);
        assert_eq!(ts.sub_second_nanos(), 0);
    }

    #[test]
    fn test_before_epoch() {
        let ts = Timestamp::from_unix_secs(-10).unwrap();
        assert_eq!(ts.as_unix_secs(), -10);
        assert!(Timestamp::from_unix_secs(i64::MIN).is_none());
    }

    #[test]
    fn test_dos_datetime() {
        // 1980-01-01 00:00:00
        let ts = Timestamp::from_dos_datetime(0x0021, 0).unwrap();
        assert_eq!(ts.as_unix_secs(), 315_532_800);
        // 2020-06-15 12:30:10
        let date = (40 << 9) | (6 << 5) | 15;
        let time = (12 << 11) | (30 << 5) | 5;
        let ts = Timestamp::from_dos_datetime(date, time).unwrap();
        assert_eq!(ts.as_unix_secs(), 1_592_224_210);
    }

    #[test]
    fn test_dos_invalid() {
        assert!(Timestamp::from_dos_datetime(0, 0).is_none());
        // month 13
        assert!(Timestamp::from_dos_datetime((13 << 5) | 1, 0).is_none());
        // hour 24
        assert!(Timestamp::from_dos_datetime(0x0021, 24 << 11).is_none());
    }

    #[test]
    fn test_filetime_parts() {
        assert!(Timestamp::from_filetime_parts(0, 0).is_none());
        assert!(Timestamp::from_filetime_parts(u32::MAX, u32::MAX).is_none());
        let ts = Timestamp::from_filetime_parts(0x1234, 0x01D0).unwrap();
        assert_eq!(ts.as_filetime(), 0x01D0_0000_1234);
    }

    #[test]
    fn test_sub_second() {
        let ts = Timestamp::from_filetime(FILETIME_UNIX_DIFF + 12_345_678);
        assert_eq!(ts.as_unix_secs(), 1);
        assert_eq!(ts.sub_second_nanos(), 234_567_800);
        let ft = ts.as_file_time();
        assert_eq!(ft.unix_seconds(), 1);
        assert_eq!(ft.nanoseconds(), 234_567_800);
    }
}
