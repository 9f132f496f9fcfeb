//! Driver for battery-backed real-time clocks of the DS13xx
//! (DS1307/DS1337/DS1338), MCP7941x and PCF85263 families, sharing one
//! get/set interface across their different register layouts.
//!
//! The chips sit on a two-wire bus behind [`RegisterAccess`];
//! [`RealTimeClock::initialize`] probes the known bus addresses and
//! selects the first family that answers.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

mod chips;
mod datetime;
mod register_access;

use chips::Chip;

pub use crate::datetime::PowerEvent;
pub use crate::register_access::{I2cInterface, RegisterAccess};
pub use rtcc::{DateTimeAccess, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Year substituted when decoding a power-event snapshot; the hardware
/// does not retain the year across a power event.
pub const YEAR_EPOCH: i32 = 1970;

#[derive(Debug)]
pub enum Error<E> {
    /// Bus error from the underlying interface
    Interface(E),
    /// No supported RTC answered at its bus address, or no variant has
    /// been selected yet
    NoDevice,
    /// The selected chip does not implement the requested function
    UnsupportedFunction,
    /// Input the chips cannot store, such as a year outside 2000-2099
    InvalidInputData,
    /// Register contents that do not decode to a valid date and time
    InvalidDeviceState,
}

/// The supported chip families. Selected once at initialization; the
/// variant fixes the bus address, the register map and which auxiliary
/// operations exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceVariant {
    /// DS1307, DS1337, DS1338
    Ds13xx,
    Mcp7941x,
    Pcf85263,
}

impl DeviceVariant {
    /// The order [`RealTimeClock::initialize`] probes the bus in.
    pub const PROBE_ORDER: [DeviceVariant; 3] = [
        DeviceVariant::Ds13xx,
        DeviceVariant::Mcp7941x,
        DeviceVariant::Pcf85263,
    ];

    /// Fixed 7-bit bus address of the family.
    pub const fn bus_address(self) -> u8 {
        match self {
            DeviceVariant::Ds13xx => 0x68,
            DeviceVariant::Mcp7941x => 0x6F,
            DeviceVariant::Pcf85263 => 0x51,
        }
    }

    /// Starting register of a time function, or None where the family
    /// does not provide it.
    pub const fn register_for(self, func: TimeFunction) -> Option<u8> {
        match (self, func) {
            (DeviceVariant::Ds13xx, TimeFunction::Time) => Some(0x00),
            (DeviceVariant::Ds13xx, _) => None,

            (DeviceVariant::Mcp7941x, TimeFunction::Time) => Some(0x00),
            (DeviceVariant::Mcp7941x, TimeFunction::Alarm0) => Some(0x0A),
            (DeviceVariant::Mcp7941x, TimeFunction::Alarm1) => Some(0x11),
            (DeviceVariant::Mcp7941x, TimeFunction::PowerFailed) => Some(0x18),
            (DeviceVariant::Mcp7941x, TimeFunction::PowerRestored) => Some(0x1C),

            (DeviceVariant::Pcf85263, TimeFunction::Time) => Some(0x01),
            (DeviceVariant::Pcf85263, TimeFunction::Alarm0) => Some(0x08),
            (DeviceVariant::Pcf85263, TimeFunction::Alarm1) => Some(0x0D),
            (DeviceVariant::Pcf85263, _) => None,
        }
    }
}

/// Logical register groups a chip may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFunction {
    Time,
    Alarm0,
    Alarm1,
    PowerFailed,
    PowerRestored,
}

/// What [`RealTimeClock::clock_event`] read for a [`TimeFunction`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    Time(NaiveDateTime),
    Power(PowerEvent),
}

/// Square-wave output frequencies the chips can drive. Frequency
/// configuration is declared but not implemented; see
/// [`RealTimeClock::set_square_wave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareWaveFrequency {
    _1Hz,
    _4_096Hz,
    _8_192Hz,
    _32_768Hz,
    /// MCP7941x device-specific calibration output
    Calibration,
    // the PCF85263 adds these
    _1_024Hz,
    _2_048Hz,
    _16_384Hz,
    OutputLow,
}

/// Driver for one RTC on the bus.
///
/// Not safe to share between callers without external serialization:
/// the stop/write/start sequence around a time write spans several bus
/// transactions.
pub struct RealTimeClock<I> {
    interface: I,
    variant: Option<DeviceVariant>,
}

impl<I, E> RealTimeClock<I>
where
    I: RegisterAccess<Error = E>,
{
    pub fn new(interface: I) -> Self {
        RealTimeClock {
            interface,
            variant: None,
        }
    }

    pub fn release(self) -> I {
        self.interface
    }

    /// The variant selected by initialization, if any.
    pub fn variant(&self) -> Option<DeviceVariant> {
        self.variant
    }

    /// Probes the known bus addresses in [`DeviceVariant::PROBE_ORDER`]
    /// and keeps the first family that answers, applies its idle
    /// configuration and starts the clock.
    ///
    /// A probe that errors at the transport level counts the same as no
    /// device at that address; the next candidate is tried. No retries.
    pub fn initialize(&mut self) -> Result<DeviceVariant, Error<E>> {
        self.variant = None;

        for candidate in DeviceVariant::PROBE_ORDER {
            if self.interface.probe(candidate.bus_address()).is_ok() {
                self.variant = Some(candidate);
                self.configure_variant(candidate)?;
                return Ok(candidate);
            }
        }

        Err(Error::NoDevice)
    }

    /// Like [`initialize`](Self::initialize) but probes only the given
    /// variant instead of scanning.
    pub fn initialize_with_variant(&mut self, variant: DeviceVariant) -> Result<(), Error<E>> {
        self.variant = None;

        self.interface
            .probe(variant.bus_address())
            .map_err(|_| Error::NoDevice)?;

        self.variant = Some(variant);
        self.configure_variant(variant)
    }

    fn configure_variant(&mut self, variant: DeviceVariant) -> Result<(), Error<E>> {
        match variant {
            DeviceVariant::Ds13xx => {
                chips::Ds13xx::configure(&mut self.interface)?;
                chips::Ds13xx::start(&mut self.interface)
            }
            DeviceVariant::Mcp7941x => {
                chips::Mcp7941x::configure(&mut self.interface)?;
                chips::Mcp7941x::start(&mut self.interface)
            }
            DeviceVariant::Pcf85263 => {
                chips::Pcf85263::configure(&mut self.interface)?;
                chips::Pcf85263::start(&mut self.interface)
            }
        }
    }

    pub(crate) fn selected(&self) -> Result<DeviceVariant, Error<E>> {
        self.variant.ok_or(Error::NoDevice)
    }

    /// Resumes the chip's counters.
    pub fn start_clock(&mut self) -> Result<(), Error<E>> {
        match self.selected()? {
            DeviceVariant::Ds13xx => chips::Ds13xx::start(&mut self.interface),
            DeviceVariant::Mcp7941x => chips::Mcp7941x::start(&mut self.interface),
            DeviceVariant::Pcf85263 => chips::Pcf85263::start(&mut self.interface),
        }
    }

    /// Halts the chip's counters.
    pub fn stop_clock(&mut self) -> Result<(), Error<E>> {
        match self.selected()? {
            DeviceVariant::Ds13xx => chips::Ds13xx::stop(&mut self.interface),
            DeviceVariant::Mcp7941x => chips::Mcp7941x::stop(&mut self.interface),
            DeviceVariant::Pcf85263 => chips::Pcf85263::stop(&mut self.interface),
        }
    }

    /// Issues a software reset. Only the PCF85263 has a reset command;
    /// other variants report [`Error::UnsupportedFunction`].
    pub fn reset_clock(&mut self) -> Result<(), Error<E>> {
        match self.selected()? {
            DeviceVariant::Ds13xx => chips::Ds13xx::reset(&mut self.interface),
            DeviceVariant::Mcp7941x => chips::Mcp7941x::reset(&mut self.interface),
            DeviceVariant::Pcf85263 => chips::Pcf85263::reset(&mut self.interface),
        }
    }

    /// Switches the backup battery supply. MCP7941x only; the write is
    /// skipped when the bit already matches and is otherwise wrapped in
    /// stop/start.
    pub fn enable_battery_backup(&mut self, enable: bool) -> Result<(), Error<E>> {
        match self.selected()? {
            DeviceVariant::Ds13xx => {
                chips::Ds13xx::set_battery_backup(&mut self.interface, enable)
            }
            DeviceVariant::Mcp7941x => {
                chips::Mcp7941x::set_battery_backup(&mut self.interface, enable)
            }
            DeviceVariant::Pcf85263 => {
                chips::Pcf85263::set_battery_backup(&mut self.interface, enable)
            }
        }
    }

    /// Generalized accessor over the time functions. Reads the current
    /// time, or the power-failed/power-restored snapshot on the
    /// MCP7941x. Alarm readback is not handled on any variant yet and
    /// reports [`Error::UnsupportedFunction`], as does any function the
    /// register map marks unsupported; nothing touches the bus in those
    /// cases.
    pub fn clock_event(&mut self, func: TimeFunction) -> Result<ClockEvent, Error<E>> {
        match func {
            TimeFunction::Time => Ok(ClockEvent::Time(self.datetime()?)),
            TimeFunction::PowerFailed | TimeFunction::PowerRestored => {
                Ok(ClockEvent::Power(self.power_event(func)?))
            }
            TimeFunction::Alarm0 | TimeFunction::Alarm1 => Err(Error::UnsupportedFunction),
        }
    }

    /// The timestamp latched when main power was lost. MCP7941x only.
    pub fn power_failed(&mut self) -> Result<PowerEvent, Error<E>> {
        self.power_event(TimeFunction::PowerFailed)
    }

    /// The timestamp latched when main power came back. MCP7941x only.
    pub fn power_restored(&mut self) -> Result<PowerEvent, Error<E>> {
        self.power_event(TimeFunction::PowerRestored)
    }

    fn power_event(&mut self, func: TimeFunction) -> Result<PowerEvent, Error<E>> {
        let variant = self.selected()?;
        if variant != DeviceVariant::Mcp7941x {
            return Err(Error::UnsupportedFunction);
        }

        let register = variant.register_for(func).ok_or(Error::UnsupportedFunction)?;
        let raw: [u8; 4] = self
            .interface
            .read_register_multiple(chips::Mcp7941x::ADDRESS, register)
            .map_err(Error::Interface)?;

        datetime::decode_power_event(raw)
    }

    /// Square-wave output configuration is declared for completeness
    /// but not implemented; the call performs no bus traffic.
    pub fn set_square_wave(&mut self, _frequency: SquareWaveFrequency) -> Result<(), Error<E>> {
        self.selected()?;
        Ok(())
    }
}

impl<I2C, E> RealTimeClock<I2cInterface<I2C>>
where
    I2C: embedded_hal::i2c::I2c<Error = E>,
{
    pub fn new_with_i2c(i2c: I2C) -> Self {
        Self::new(I2cInterface::new(i2c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const NACK: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);

    fn rtc_with_variant(
        expectations: &[I2cTransaction],
        variant: DeviceVariant,
    ) -> RealTimeClock<I2cInterface<I2cMock>> {
        RealTimeClock {
            interface: I2cInterface::new(I2cMock::new(expectations)),
            variant: Some(variant),
        }
    }

    #[test]
    fn test_register_map_matches_table() {
        let table = [
            (DeviceVariant::Ds13xx, [Some(0x00), None, None, None, None]),
            (
                DeviceVariant::Mcp7941x,
                [Some(0x00), Some(0x0A), Some(0x11), Some(0x18), Some(0x1C)],
            ),
            (
                DeviceVariant::Pcf85263,
                [Some(0x01), Some(0x08), Some(0x0D), None, None],
            ),
        ];
        let funcs = [
            TimeFunction::Time,
            TimeFunction::Alarm0,
            TimeFunction::Alarm1,
            TimeFunction::PowerFailed,
            TimeFunction::PowerRestored,
        ];

        for (variant, registers) in table {
            for (func, register) in funcs.iter().zip(registers) {
                assert_eq!(
                    variant.register_for(*func),
                    register,
                    "{:?}/{:?}",
                    variant,
                    func
                );
            }
        }
    }

    #[test]
    fn test_initialize_selects_first_responder() {
        // DS13xx and MCP7941x absent; the PCF85263 answers and gets
        // configured at its own address only
        let expectations = [
            I2cTransaction::write_read(0x68, vec![0x00], vec![0x00]).with_error(NACK),
            I2cTransaction::write_read(0x6F, vec![0x00], vec![0x00]).with_error(NACK),
            I2cTransaction::write_read(0x51, vec![0x00], vec![0x00]),
            I2cTransaction::write(
                0x51,
                vec![0x23, 0x00, 0x00, 0x12, 0x00, 0x00, 0x07, 0x00, 0x00],
            ),
            I2cTransaction::write(0x51, vec![0x2E, 0x00]),
        ];

        let mut rtc = RealTimeClock::new(I2cInterface::new(I2cMock::new(&expectations)));
        assert_eq!(rtc.initialize().unwrap(), DeviceVariant::Pcf85263);
        assert_eq!(rtc.variant(), Some(DeviceVariant::Pcf85263));

        rtc.release().release().done();
    }

    #[test]
    fn test_initialize_no_device() {
        let expectations = [
            I2cTransaction::write_read(0x68, vec![0x00], vec![0x00]).with_error(NACK),
            I2cTransaction::write_read(0x6F, vec![0x00], vec![0x00]).with_error(NACK),
            I2cTransaction::write_read(0x51, vec![0x00], vec![0x00]).with_error(NACK),
        ];

        let mut rtc = RealTimeClock::new(I2cInterface::new(I2cMock::new(&expectations)));
        assert!(matches!(rtc.initialize(), Err(Error::NoDevice)));
        assert_eq!(rtc.variant(), None);

        rtc.release().release().done();
    }

    #[test]
    fn test_initialize_with_variant_skips_probing_order() {
        let expectations = [
            I2cTransaction::write_read(0x6F, vec![0x00], vec![0x00]),
            // configure: battery backup already enabled, clear trim
            I2cTransaction::write_read(0x6F, vec![0x03], vec![0x08]),
            I2cTransaction::write(0x6F, vec![0x08, 0x00]),
            // start
            I2cTransaction::write_read(0x6F, vec![0x00], vec![0x25]),
            I2cTransaction::write(0x6F, vec![0x00, 0xA5]),
        ];

        let mut rtc = RealTimeClock::new(I2cInterface::new(I2cMock::new(&expectations)));
        rtc.initialize_with_variant(DeviceVariant::Mcp7941x).unwrap();
        assert_eq!(rtc.variant(), Some(DeviceVariant::Mcp7941x));

        rtc.release().release().done();
    }

    #[test]
    fn test_initialize_with_variant_absent() {
        let expectations =
            [I2cTransaction::write_read(0x68, vec![0x00], vec![0x00]).with_error(NACK)];

        let mut rtc = RealTimeClock::new(I2cInterface::new(I2cMock::new(&expectations)));
        assert!(matches!(
            rtc.initialize_with_variant(DeviceVariant::Ds13xx),
            Err(Error::NoDevice)
        ));
        assert_eq!(rtc.variant(), None);

        rtc.release().release().done();
    }

    #[test]
    fn test_initialize_ds13xx_configures_nothing_extra() {
        let expectations = [
            I2cTransaction::write_read(0x68, vec![0x00], vec![0x00]),
            // start: clock already running, read only
            I2cTransaction::write_read(0x68, vec![0x00], vec![0x25]),
        ];

        let mut rtc = RealTimeClock::new(I2cInterface::new(I2cMock::new(&expectations)));
        assert_eq!(rtc.initialize().unwrap(), DeviceVariant::Ds13xx);

        rtc.release().release().done();
    }

    #[test]
    fn test_power_failed() {
        let expectations = [I2cTransaction::write_read(
            0x6F,
            vec![0x18],
            vec![0x30, 0x12, 0x25, 0x69],
        )];

        let mut rtc = rtc_with_variant(&expectations, DeviceVariant::Mcp7941x);
        let event = rtc.power_failed().unwrap();
        assert_eq!(
            event,
            PowerEvent {
                minute: 30,
                hour: 12,
                day: 25,
                month: 9,
                weekday: 2,
            }
        );

        rtc.release().release().done();
    }

    #[test]
    fn test_power_restored_reads_its_own_register() {
        let expectations = [I2cTransaction::write_read(
            0x6F,
            vec![0x1C],
            vec![0x15, 0x08, 0x01, 0x41],
        )];

        let mut rtc = rtc_with_variant(&expectations, DeviceVariant::Mcp7941x);
        let event = rtc.power_restored().unwrap();
        assert_eq!(event.minute, 15);
        assert_eq!(event.month, 1);
        assert_eq!(event.weekday, 1);

        rtc.release().release().done();
    }

    #[test]
    fn test_clock_event_time() {
        let expectations = [I2cTransaction::write_read(
            0x68,
            vec![0x00],
            vec![0x40, 0x30, 0x10, 0x04, 0x15, 0x05, 0x24],
        )];

        let mut rtc = rtc_with_variant(&expectations, DeviceVariant::Ds13xx);
        let event = rtc.clock_event(TimeFunction::Time).unwrap();
        assert_eq!(
            event,
            ClockEvent::Time(
                NaiveDate::from_ymd_opt(2024, 5, 15)
                    .unwrap()
                    .and_hms_opt(10, 30, 40)
                    .unwrap()
            )
        );

        rtc.release().release().done();
    }

    #[test]
    fn test_unsupported_functions_touch_no_bus() {
        let mut rtc = rtc_with_variant(&[], DeviceVariant::Ds13xx);
        assert!(matches!(
            rtc.clock_event(TimeFunction::PowerFailed),
            Err(Error::UnsupportedFunction)
        ));
        rtc.release().release().done();

        // alarm readback is not handled even on the MCP7941x, which
        // does have alarm registers
        let mut rtc = rtc_with_variant(&[], DeviceVariant::Mcp7941x);
        assert!(matches!(
            rtc.clock_event(TimeFunction::Alarm0),
            Err(Error::UnsupportedFunction)
        ));
        rtc.release().release().done();

        let mut rtc = rtc_with_variant(&[], DeviceVariant::Pcf85263);
        assert!(matches!(
            rtc.clock_event(TimeFunction::Alarm1),
            Err(Error::UnsupportedFunction)
        ));
        assert!(matches!(
            rtc.power_failed(),
            Err(Error::UnsupportedFunction)
        ));
        rtc.release().release().done();
    }

    #[test]
    fn test_operations_require_initialization() {
        let mut rtc = RealTimeClock::new(I2cInterface::new(I2cMock::new(&[])));
        assert!(matches!(rtc.datetime(), Err(Error::NoDevice)));
        assert!(matches!(rtc.start_clock(), Err(Error::NoDevice)));

        rtc.release().release().done();
    }

    #[test]
    fn test_set_square_wave_is_a_no_op() {
        let mut rtc = rtc_with_variant(&[], DeviceVariant::Pcf85263);
        rtc.set_square_wave(SquareWaveFrequency::_32_768Hz).unwrap();

        rtc.release().release().done();
    }
}
