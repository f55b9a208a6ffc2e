use time::error::ComponentRange;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// Packed MS-DOS date and time as stored in ZIP headers.
///
/// The wall-clock fields of the input are used as given; no timezone
/// conversion happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DosDateTime {
    date: u16,
    time: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable value.
    pub const MIN: DosDateTime = DosDateTime {
        date: 1 << 5 | 1,
        time: 0,
    };

    /// 2107-12-31 23:59:58, the latest representable value.
    pub const MAX: DosDateTime = DosDateTime {
        date: 127 << 9 | 12 << 5 | 31,
        time: 23 << 11 | 59 << 5 | 29,
    };

    /// Pack calendar fields. Out-of-range years clamp to [`Self::MIN`] / [`Self::MAX`].
    ///
    /// # Errors
    ///
    /// Fails if the fields do not form a valid date and time, e.g. month 13,
    /// February 30th or hour 24.
    pub fn new(
        year: i32,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, ComponentRange> {
        let date = Date::from_calendar_date(year, Month::try_from(month)?, day)?;
        let time = Time::from_hms(hour, minute, second)?;
        Ok(Self::from(PrimitiveDateTime::new(date, time)))
    }

    /// Current local time, or UTC when the local offset cannot be determined.
    pub fn now() -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::from(now)
    }

    pub fn from_raw(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    pub fn date(&self) -> u16 {
        self.date
    }

    pub fn time(&self) -> u16 {
        self.time
    }

    /// Unpack into (year, month, day, hour, minute, second).
    pub fn to_parts(&self) -> (u16, u8, u8, u8, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (year, month, day, hour, minute, second)
    }
}

impl From<PrimitiveDateTime> for DosDateTime {
    fn from(dt: PrimitiveDateTime) -> Self {
        let year = dt.year();
        if year < 1980 {
            return Self::MIN;
        }
        if year > 2107 {
            return Self::MAX;
        }
        Self {
            date: ((year - 1980) as u16) << 9 | (dt.month() as u16) << 5 | dt.day() as u16,
            time: (dt.hour() as u16) << 11 | (dt.minute() as u16) << 5 | (dt.second() as u16) / 2,
        }
    }
}

impl From<OffsetDateTime> for DosDateTime {
    fn from(dt: OffsetDateTime) -> Self {
        Self::from(PrimitiveDateTime::new(dt.date(), dt.time()))
    }
}
