/// Raw register access to a device on the shared two-wire bus.
///
/// The device address is a parameter on every call because the driver
/// selects between several bus addresses at run time while probing for
/// a chip.
pub trait RegisterAccess {
    type Error;

    fn write_register(&mut self, address: u8, register: u8, value: u8)
        -> Result<(), Self::Error>;
    fn write_registers(
        &mut self,
        address: u8,
        start_register: u8,
        values: &[u8],
    ) -> Result<(), Self::Error>;

    fn read_register(&mut self, address: u8, register: u8) -> Result<u8, Self::Error>;
    fn read_registers(
        &mut self,
        address: u8,
        start_register: u8,
        values: &mut [u8],
    ) -> Result<(), Self::Error>;

    fn read_register_multiple<const N: usize>(
        &mut self,
        address: u8,
        start_register: u8,
    ) -> Result<[u8; N], Self::Error>
    where
        Self: Sized,
    {
        let mut values = [0u8; N];

        self.read_registers(address, start_register, &mut values)
            .and(Ok(values))
    }

    /// Zero-length probe: set the register pointer to 0 and request a
    /// single byte. Ok means something acknowledged at `address`.
    fn probe(&mut self, address: u8) -> Result<(), Self::Error> {
        self.read_register(address, 0).and(Ok(()))
    }
}

pub struct I2cInterface<I2C> {
    i2c: I2C,
}

impl<I2C> I2cInterface<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> RegisterAccess for I2cInterface<I2C>
where
    I2C: embedded_hal::i2c::I2c<Error = E>,
{
    type Error = E;

    fn write_register(&mut self, address: u8, register: u8, value: u8) -> Result<(), Self::Error> {
        let payload = [register, value];

        self.i2c.write(address, &payload)
    }

    fn write_registers(
        &mut self,
        address: u8,
        start_register: u8,
        values: &[u8],
    ) -> Result<(), Self::Error> {
        // Block writes must be one transaction: the chips auto-increment
        // the register pointer, and the PCF85263 stop sequence relies on
        // it wrapping past the last register. The longest block any chip
        // takes is its 8-byte configuration run.
        debug_assert!(values.len() <= 8);

        let mut payload = [0u8; 9];
        payload[0] = start_register;
        payload[1..=values.len()].copy_from_slice(values);

        self.i2c.write(address, &payload[..values.len() + 1])
    }

    fn read_register(&mut self, address: u8, register: u8) -> Result<u8, Self::Error> {
        let mut value = [0u8; 1];

        self.read_registers(address, register, &mut value)?;

        Ok(value[0])
    }

    fn read_registers(
        &mut self,
        address: u8,
        start_register: u8,
        values: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.i2c.write_read(address, &[start_register], values)
    }
}
