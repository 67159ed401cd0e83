use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use filetime::FileTime;

/// Packed FAT-style date and time: date in the high 16 bits, time in the low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl PackedTime {
    pub fn decode(raw: u32) -> Self {
        let date = (raw >> 16) as u16;
        let time = raw as u16;
        Self {
            year: (date >> 9) + 1980,
            month: ((date >> 5) & 0x0F) as u8,
            day: (date & 0x1F) as u8,
            hour: (time >> 11) as u8,
            minute: ((time >> 5) & 0x3F) as u8,
            second: ((time & 0x1F) * 2) as u8,
        }
    }

    /// `None` when the fields do not form a real calendar date and time.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?.and_hms_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
        )
    }

    /// The time as a file timestamp, interpreted in the local time zone.
    pub fn to_file_time(&self) -> Option<FileTime> {
        let local = Local.from_local_datetime(&self.to_naive()?).earliest()?;
        Some(FileTime::from_unix_time(local.timestamp(), 0))
    }
}
