use crate::chips;
use crate::register_access::RegisterAccess;
use crate::{DeviceVariant, Error, RealTimeClock, YEAR_EPOCH};

use chrono::DateTime;
use rtcc::{DateTimeAccess, Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Field order of the 7-byte time record.
///
/// All three chip families store seconds, minutes, hours, month and
/// year in the same slots; they disagree on the two in the middle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordLayout {
    /// Weekday register ahead of day-of-month, weekday stored 1-7
    /// (DS13xx, MCP7941x).
    WeekdayThenDay,
    /// Day-of-month ahead of weekday, weekday stored 0-6 (PCF85263).
    DayThenWeekday,
}

/// Control bits folded into an outgoing time record so a block write
/// does not clobber them.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TimeWriteMasks {
    /// OR-ed into the seconds byte (DS13xx clock-halt bit).
    pub seconds: u8,
    /// OR-ed into the weekday byte (MCP7941x oscillator/battery bits).
    pub weekday: u8,
}

impl<I, E> DateTimeAccess for RealTimeClock<I>
where
    I: RegisterAccess<Error = E>,
{
    type Error = Error<E>;

    fn datetime(&mut self) -> Result<NaiveDateTime, Self::Error> {
        self.datetime()
    }

    fn set_datetime(&mut self, datetime: &NaiveDateTime) -> Result<(), Self::Error> {
        self.set_datetime(datetime)
    }
}

impl<I, E> RealTimeClock<I>
where
    I: RegisterAccess<Error = E>,
{
    /// Reads the current date and time from the selected chip.
    pub fn datetime(&mut self) -> Result<NaiveDateTime, Error<E>> {
        match self.selected()? {
            DeviceVariant::Ds13xx => chips::read_time::<chips::Ds13xx, I>(&mut self.interface),
            DeviceVariant::Mcp7941x => {
                chips::read_time::<chips::Mcp7941x, I>(&mut self.interface)
            }
            DeviceVariant::Pcf85263 => {
                chips::read_time::<chips::Pcf85263, I>(&mut self.interface)
            }
        }
    }

    /// Writes a new date and time, halting the counters around the
    /// block write and restarting them afterwards.
    pub fn set_datetime(&mut self, datetime: &NaiveDateTime) -> Result<(), Error<E>> {
        match self.selected()? {
            DeviceVariant::Ds13xx => {
                chips::write_time::<chips::Ds13xx, I>(&mut self.interface, datetime)
            }
            DeviceVariant::Mcp7941x => {
                chips::write_time::<chips::Mcp7941x, I>(&mut self.interface, datetime)
            }
            DeviceVariant::Pcf85263 => {
                chips::write_time::<chips::Pcf85263, I>(&mut self.interface, datetime)
            }
        }
    }

    /// Reads the current time as seconds since the Unix epoch.
    pub fn timestamp(&mut self) -> Result<i64, Error<E>> {
        Ok(self.datetime()?.and_utc().timestamp())
    }

    /// Writes the time from seconds since the Unix epoch.
    pub fn set_timestamp(&mut self, secs: i64) -> Result<(), Error<E>> {
        let datetime = DateTime::from_timestamp(secs, 0)
            .ok_or(Error::InvalidInputData)?
            .naive_utc();

        self.set_datetime(&datetime)
    }
}

/// Reduced-precision timestamp the MCP7941x latches on a power-fail or
/// power-restore event. The hardware does not capture seconds or the
/// year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerEvent {
    pub minute: u8,
    /// Always 24-hour; the snapshot has no 12-hour flag.
    pub hour: u8,
    pub day: u8,
    /// 1-12
    pub month: u8,
    /// 0-6
    pub weekday: u8,
}

impl PowerEvent {
    /// The snapshot as a [`NaiveDateTime`], with seconds zeroed and the
    /// year pinned to [`YEAR_EPOCH`]. None if the latched fields do not
    /// form a valid date in that year.
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(YEAR_EPOCH, self.month.into(), self.day.into())?
            .and_hms_opt(self.hour.into(), self.minute.into(), 0)
    }
}

pub(crate) fn encode_record<E>(
    datetime: &NaiveDateTime,
    layout: RecordLayout,
    masks: TimeWriteMasks,
) -> Result<[u8; 7], Error<E>> {
    let weekday = datetime.weekday().num_days_from_sunday() as u8;
    let day = encode_bcd(datetime.day() as u8);

    let (third, fourth) = match layout {
        RecordLayout::WeekdayThenDay => (encode_bcd(weekday + 1) | masks.weekday, day),
        RecordLayout::DayThenWeekday => (day, encode_bcd(weekday) | masks.weekday),
    };

    Ok([
        encode_bcd(datetime.second() as u8) | masks.seconds,
        encode_bcd(datetime.minute() as u8),
        encode_bcd(datetime.hour() as u8),
        third,
        fourth,
        encode_bcd(datetime.month() as u8),
        encode_year(datetime.year())?,
    ])
}

pub(crate) fn decode_record<E>(
    raw: &[u8; 7],
    layout: RecordLayout,
) -> Result<NaiveDateTime, Error<E>> {
    let second = decode_bcd(raw[0] & 0x7F);
    let minute = decode_bcd(raw[1] & 0x7F);
    let hour = decode_hours(raw[2]);

    // The stored weekday is discarded: chrono derives it from the
    // date, and the encoder writes that derived value anyway.
    let day = match layout {
        RecordLayout::WeekdayThenDay => decode_bcd(raw[4] & 0x3F),
        RecordLayout::DayThenWeekday => decode_bcd(raw[3] & 0x3F),
    };
    let month = decode_bcd(raw[5] & 0x1F);
    // Two year digits on every chip; assume the 21st century.
    let year = 2000 + decode_bcd(raw[6]) as i32;

    NaiveDate::from_ymd_opt(year, month.into(), day.into())
        .and_then(|date| date.and_hms_opt(hour.into(), minute.into(), second.into()))
        .ok_or(Error::InvalidDeviceState)
}

/// Decodes the 4-byte MCP7941x power-event snapshot: minutes, hours,
/// day-of-month, then month in the low five bits packed with a 1-based
/// weekday in the top three.
pub(crate) fn decode_power_event<E>(raw: [u8; 4]) -> Result<PowerEvent, Error<E>> {
    let month = decode_bcd(raw[3] & 0x1F);
    let weekday = raw[3] >> 5;

    if !(1..=12).contains(&month) || !(1..=7).contains(&weekday) {
        return Err(Error::InvalidDeviceState);
    }

    Ok(PowerEvent {
        minute: decode_bcd(raw[0] & 0x7F),
        hour: decode_bcd(raw[1] & 0x3F),
        day: decode_bcd(raw[2] & 0x3F),
        month,
        weekday: weekday - 1,
    })
}

/// Normalizes an hour register byte to 0-23. Bit 6 flags 12-hour mode:
/// the low five bits then hold BCD 1-12 and bit 5 selects the later
/// half of the day (which half it means is the writer's convention).
pub(crate) fn decode_hours(raw: u8) -> u8 {
    if raw & 0x40 != 0 {
        let hour = decode_bcd(raw & 0x1F);
        if raw & 0x20 != 0 {
            hour + 12
        } else {
            hour
        }
    } else {
        decode_bcd(raw & 0x3F)
    }
}

fn encode_year<E>(year: i32) -> Result<u8, Error<E>> {
    // Every chip stores two year digits, read back on a 2000 base.
    if !(2000..=2099).contains(&year) {
        return Err(Error::InvalidInputData);
    }

    Ok(encode_bcd((year - 2000) as u8))
}

pub(crate) fn decode_bcd(bcd: u8) -> u8 {
    let unit = bcd & 0xF;
    let tens = (bcd >> 4) & 0xF;

    unit + tens * 10
}

pub(crate) fn encode_bcd(val: u8) -> u8 {
    let unit = val % 10;
    let tens = val / 10;

    unit | (tens << 4)
}
