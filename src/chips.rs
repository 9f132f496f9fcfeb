//! Per-chip-family behavior: clock sequencing, idle configuration and
//! the quirks of each family's time record.
//!
//! Everything a chip does differently from the others lives behind the
//! [`Chip`] trait, one implementation per family, so adding a fourth
//! family is a new impl rather than edits across the driver.

use crate::datetime::{self, RecordLayout, TimeWriteMasks};
use crate::register_access::RegisterAccess;
use crate::{DeviceVariant, Error, TimeFunction};

use rtcc::NaiveDateTime;

pub(crate) trait Chip {
    const VARIANT: DeviceVariant;
    const ADDRESS: u8;
    const LAYOUT: RecordLayout;

    fn register_for(func: TimeFunction) -> Option<u8> {
        Self::VARIANT.register_for(func)
    }

    /// Idle defaults applied once after a successful probe.
    fn configure<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>>;

    fn start<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>>;

    fn stop<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>>;

    fn reset<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        let _ = bus;
        Err(Error::UnsupportedFunction)
    }

    fn set_battery_backup<I: RegisterAccess>(
        bus: &mut I,
        enable: bool,
    ) -> Result<(), Error<I::Error>> {
        let _ = (bus, enable);
        Err(Error::UnsupportedFunction)
    }

    /// Halts the counters ahead of a time write and reports the control
    /// bits the outgoing record has to carry so the block write does
    /// not clobber them.
    fn halt_for_time_write<I: RegisterAccess>(
        bus: &mut I,
    ) -> Result<TimeWriteMasks, Error<I::Error>>;
}

pub(crate) fn write_time<C: Chip, I: RegisterAccess>(
    bus: &mut I,
    datetime: &NaiveDateTime,
) -> Result<(), Error<I::Error>> {
    let masks = C::halt_for_time_write(bus)?;
    let record = datetime::encode_record(datetime, C::LAYOUT, masks)?;
    let register = C::register_for(TimeFunction::Time).ok_or(Error::UnsupportedFunction)?;

    bus.write_registers(C::ADDRESS, register, &record)
        .map_err(Error::Interface)?;

    C::start(bus)
}

pub(crate) fn read_time<C: Chip, I: RegisterAccess>(
    bus: &mut I,
) -> Result<NaiveDateTime, Error<I::Error>> {
    let register = C::register_for(TimeFunction::Time).ok_or(Error::UnsupportedFunction)?;
    let record: [u8; 7] = bus
        .read_register_multiple(C::ADDRESS, register)
        .map_err(Error::Interface)?;

    datetime::decode_record(&record, C::LAYOUT)
}

/// DS1307/DS1337/DS1338 family. Runs whenever the clock-halt bit in the
/// seconds register is clear; needs no configuration beyond that.
pub(crate) struct Ds13xx;

impl Ds13xx {
    const SECONDS: u8 = 0x00;
    const CLOCK_HALT: u8 = 0x80;
}

impl Chip for Ds13xx {
    const VARIANT: DeviceVariant = DeviceVariant::Ds13xx;
    const ADDRESS: u8 = DeviceVariant::Ds13xx.bus_address();
    const LAYOUT: RecordLayout = RecordLayout::WeekdayThenDay;

    fn configure<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        let _ = bus;
        Ok(())
    }

    fn start<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        let seconds = bus
            .read_register(Self::ADDRESS, Self::SECONDS)
            .map_err(Error::Interface)?;

        if seconds & Self::CLOCK_HALT != 0 {
            bus.write_register(Self::ADDRESS, Self::SECONDS, seconds & !Self::CLOCK_HALT)
                .map_err(Error::Interface)?;
        }

        Ok(())
    }

    fn stop<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        let seconds = bus
            .read_register(Self::ADDRESS, Self::SECONDS)
            .map_err(Error::Interface)?;

        bus.write_register(Self::ADDRESS, Self::SECONDS, seconds | Self::CLOCK_HALT)
            .map_err(Error::Interface)
    }

    fn halt_for_time_write<I: RegisterAccess>(
        bus: &mut I,
    ) -> Result<TimeWriteMasks, Error<I::Error>> {
        Self::stop(bus)?;

        // Keep the clock halted through the block write; start() clears
        // the bit afterwards.
        Ok(TimeWriteMasks {
            seconds: Self::CLOCK_HALT,
            weekday: 0,
        })
    }
}

/// MCP7941x family. Runs while the start bit in the seconds register is
/// set; the weekday register doubles as oscillator status and battery
/// backup control.
pub(crate) struct Mcp7941x;

impl Mcp7941x {
    const SECONDS: u8 = 0x00;
    const WEEKDAY: u8 = 0x03;
    const OSC_TRIM: u8 = 0x08;

    const START: u8 = 0x80;
    const VBATEN: u8 = 0x08;
    /// OSCRUN, PWRFAIL and VBATEN, held in the weekday register.
    const OSC_STATE_MASK: u8 = 0x38;
}

impl Chip for Mcp7941x {
    const VARIANT: DeviceVariant = DeviceVariant::Mcp7941x;
    const ADDRESS: u8 = DeviceVariant::Mcp7941x.bus_address();
    const LAYOUT: RecordLayout = RecordLayout::WeekdayThenDay;

    fn configure<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        Self::set_battery_backup(bus, true)?;

        bus.write_register(Self::ADDRESS, Self::OSC_TRIM, 0x00)
            .map_err(Error::Interface)
    }

    fn start<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        let seconds = bus
            .read_register(Self::ADDRESS, Self::SECONDS)
            .map_err(Error::Interface)?;

        if seconds & Self::START == 0 {
            bus.write_register(Self::ADDRESS, Self::SECONDS, seconds | Self::START)
                .map_err(Error::Interface)?;
        }

        Ok(())
    }

    fn stop<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        let seconds = bus
            .read_register(Self::ADDRESS, Self::SECONDS)
            .map_err(Error::Interface)?;

        bus.write_register(Self::ADDRESS, Self::SECONDS, seconds & !Self::START)
            .map_err(Error::Interface)
    }

    fn set_battery_backup<I: RegisterAccess>(
        bus: &mut I,
        enable: bool,
    ) -> Result<(), Error<I::Error>> {
        let weekday = bus
            .read_register(Self::ADDRESS, Self::WEEKDAY)
            .map_err(Error::Interface)?;

        if (weekday & Self::VBATEN != 0) == enable {
            return Ok(());
        }

        // Toggling the bit while the oscillator runs can glitch the
        // counters, so the write is wrapped in stop/start.
        Self::stop(bus)?;

        let weekday = if enable {
            weekday | Self::VBATEN
        } else {
            weekday & !Self::VBATEN
        };
        bus.write_register(Self::ADDRESS, Self::WEEKDAY, weekday)
            .map_err(Error::Interface)?;

        Self::start(bus)
    }

    fn halt_for_time_write<I: RegisterAccess>(
        bus: &mut I,
    ) -> Result<TimeWriteMasks, Error<I::Error>> {
        Self::stop(bus)?;

        // The oscillator/battery bits share the weekday register with
        // the weekday count and must survive the block write.
        let osc_state = bus
            .read_register(Self::ADDRESS, Self::WEEKDAY)
            .map_err(Error::Interface)?
            & Self::OSC_STATE_MASK;

        Ok(TimeWriteMasks {
            seconds: 0,
            weekday: osc_state,
        })
    }
}

/// PCF85263. Started and stopped through a dedicated stop register
/// rather than a bit in the seconds register; time registers begin at
/// address 1 behind the hundredths counter.
pub(crate) struct Pcf85263;

impl Pcf85263 {
    const CONFIG_BASE: u8 = 0x23;
    const STOP_ENABLE: u8 = 0x2E;
    const RESETS: u8 = 0x2F;

    const CLEAR_PRESCALER: u8 = 0xA4;
    const SOFTWARE_RESET: u8 = 0x2C;

    /// Offset, oscillator (24-hour mode, low jitter, 12.5pF load),
    /// battery switch, pin IO, function (clock output static low) and
    /// interrupt enables.
    const CONFIG_DEFAULTS: [u8; 8] = [0x00, 0x00, 0x12, 0x00, 0x00, 0x07, 0x00, 0x00];
}

impl Chip for Pcf85263 {
    const VARIANT: DeviceVariant = DeviceVariant::Pcf85263;
    const ADDRESS: u8 = DeviceVariant::Pcf85263.bus_address();
    const LAYOUT: RecordLayout = RecordLayout::DayThenWeekday;

    fn configure<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        bus.write_registers(Self::ADDRESS, Self::CONFIG_BASE, &Self::CONFIG_DEFAULTS)
            .map_err(Error::Interface)
    }

    fn start<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        bus.write_register(Self::ADDRESS, Self::STOP_ENABLE, 0x00)
            .map_err(Error::Interface)
    }

    fn stop<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        bus.write_register(Self::ADDRESS, Self::STOP_ENABLE, 0x01)
            .map_err(Error::Interface)
    }

    fn reset<I: RegisterAccess>(bus: &mut I) -> Result<(), Error<I::Error>> {
        bus.write_register(Self::ADDRESS, Self::RESETS, Self::SOFTWARE_RESET)
            .map_err(Error::Interface)
    }

    fn halt_for_time_write<I: RegisterAccess>(
        bus: &mut I,
    ) -> Result<TimeWriteMasks, Error<I::Error>> {
        // Stop, clear the prescaler and zero the hundredths counter in
        // one block; the register pointer wraps past 0x2F to 0x00.
        bus.write_registers(
            Self::ADDRESS,
            Self::STOP_ENABLE,
            &[0x01, Self::CLEAR_PRESCALER, 0x00],
        )
        .map_err(Error::Interface)?;

        Ok(TimeWriteMasks::default())
    }
}
