//! High-level controller facade.
//!
//! [`Laser`] offers one method per device capability. Each method performs
//! complete request/response exchanges and returns a freshly read record;
//! nothing is cached between calls.

use crate::{
    Error, Interface, Result,
    codec::Command,
    record::{self, DeviceInfo, LaserError, Power, Status, Temperature},
};
use embedded_io::{Read, Write};
use log::{debug, info};

/// Minimum output power setting in mW.
pub const MIN_POWER: f32 = 0.0;

/// Snapshot of all controller readings.
///
/// Returned by [`Laser::query_snapshot`].
#[derive(PartialEq, Clone, Debug)]
pub struct Snapshot {
    /// Identification and configuration.
    pub info: DeviceInfo,
    /// Status flags.
    pub status: Status,
    /// Temperature readings.
    pub temperature: Temperature,
    /// Power readings.
    pub power: Power,
    /// Active error, if any.
    pub error: Option<LaserError>,
}

/// Laser-diode controller connection.
///
/// Obtain an instance using [`Laser::connect`].
/// The connection is exclusively owned; callers that need shared access
/// must serialize calls themselves.
///
/// # Errors
///
/// - [`Error::ConnectionClosed`] for any operation after [`Laser::close`].
/// - [`Error::Timeout`] if the controller does not answer within the port's read timeout.
/// - [`Error::MalformedResponse`] or [`Error::FieldParse`] for unexpected responses.
///
/// # Examples
///
/// ```no_run
/// # fn example() -> lambda_mini::Result<(), lambda_mini::serial::PortError> {
/// use lambda_mini::serial::{self, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};
///
/// let port = serial::open("/dev/ttyUSB0", DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT)?;
/// let mut laser = lambda_mini::Laser::connect(port)?;
/// let info = laser.query_device_info()?;
///
/// println!("{} {}, serial number {}", info.manufacturer, info.model, info.serial_number);
/// println!("Power: {}", laser.query_power_info()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Laser<P> {
    intf: Interface<P>,
    max_power: Option<f32>,
}

impl<P: Read + Write> Laser<P> {
    /// Connects to the controller via the specified port.
    ///
    /// Initializes the controller's command interface.
    pub fn connect(port: P) -> Result<Self, P::Error> {
        let mut intf = Interface::new(port);

        intf.query(Command::Init, record::parse_ack)?;
        info!("Connected to controller");

        Ok(Self {
            intf,
            max_power: None,
        })
    }

    /// Closes the connection, releasing the port.
    ///
    /// Every further operation fails with [`Error::ConnectionClosed`].
    pub fn close(&mut self) -> Result<(), P::Error> {
        self.intf.close()
    }

    /// Returns whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.intf.is_open()
    }

    /// Queries identification and configuration of the controller.
    pub fn query_device_info(&mut self) -> Result<DeviceInfo, P::Error> {
        let status = self.query_status()?;
        let operating_time = self
            .intf
            .query(Command::OperatingTime, record::parse_operating_time)?;
        let manufacturer = self.intf.query(Command::Manufacturer, record::parse_text)?;
        let model = self.intf.query(Command::DeviceName, record::parse_text)?;
        let serial_number = self.intf.query(Command::SerialNumber, record::parse_text)?;
        let firmware = self
            .intf
            .query(Command::SoftwareVersion, record::parse_text)?;
        let wavelength = self
            .intf
            .query(Command::Wavelength, record::parse_wavelength)?;
        let features = self.intf.query(Command::Features, record::parse_text)?;
        let control = self
            .intf
            .query(Command::ControlMode, record::parse_control_mode)?;

        Ok(DeviceInfo {
            manufacturer,
            model,
            serial_number,
            firmware,
            wavelength,
            operating_time,
            features,
            control,
            status,
        })
    }

    /// Queries the status flags.
    pub fn query_status(&mut self) -> Result<Status, P::Error> {
        self.intf.query(Command::Status, record::parse_status)
    }

    /// Queries the current temperature and its limits.
    pub fn query_temperature(&mut self) -> Result<Temperature, P::Error> {
        let current = self.intf.query(Command::Temperature, |fields| {
            record::parse_temperature(fields, "temperature")
        })?;
        let min = self.intf.query(Command::TemperatureMin, |fields| {
            record::parse_temperature(fields, "minimum temperature")
        })?;
        let max = self.intf.query(Command::TemperatureMax, |fields| {
            record::parse_temperature(fields, "maximum temperature")
        })?;

        Ok(Temperature { current, min, max })
    }

    /// Queries the active error.
    ///
    /// Returns `None` if no error is active.
    pub fn query_error(&mut self) -> Result<Option<LaserError>, P::Error> {
        self.intf.query(Command::Error, record::parse_error)
    }

    /// Queries the output power setting in mW.
    pub fn query_power(&mut self) -> Result<f32, P::Error> {
        self.intf
            .query(Command::Power, |fields| record::parse_power(fields, "power"))
    }

    /// Queries the maximum output power in mW.
    ///
    /// The result becomes the ceiling used by [`Laser::set_power`].
    pub fn query_max_power(&mut self) -> Result<f32, P::Error> {
        let max = self.intf.query(Command::MaxPower, |fields| {
            record::parse_power(fields, "maximum power")
        })?;

        self.max_power = Some(max);

        Ok(max)
    }

    /// Queries the output power setting together with its range.
    pub fn query_power_info(&mut self) -> Result<Power, P::Error> {
        let current = self.query_power()?;
        let max = self.query_max_power()?;

        Ok(Power {
            current,
            min: MIN_POWER,
            max,
        })
    }

    /// Queries all readings at once.
    pub fn query_snapshot(&mut self) -> Result<Snapshot, P::Error> {
        Ok(Snapshot {
            info: self.query_device_info()?,
            status: self.query_status()?,
            temperature: self.query_temperature()?,
            power: self.query_power_info()?,
            error: self.query_error()?,
        })
    }

    /// Switches the laser output on.
    ///
    /// The power is set to zero before the output is switched on.
    pub fn enable(&mut self) -> Result<(), P::Error> {
        self.set_power(MIN_POWER)?;
        self.set_output(true)
    }

    /// Switches the laser output off.
    ///
    /// The power is set to zero before the output is switched off.
    pub fn disable(&mut self) -> Result<(), P::Error> {
        self.set_power(MIN_POWER)?;
        self.set_output(false)
    }

    /// Sets the output power in mW.
    ///
    /// The value is validated against the last queried maximum power,
    /// which is queried first if it is not known yet.
    /// Returns the setting acknowledged by the controller.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRange`] if the value is negative or exceeds the maximum power.
    ///   Nothing is sent to the controller in this case.
    pub fn set_power(&mut self, milliwatts: f32) -> Result<f32, P::Error> {
        if !self.intf.is_open() {
            return Err(Error::ConnectionClosed);
        }

        let max = match self.max_power {
            Some(max) => max,
            None => self.query_max_power()?,
        };

        if !(MIN_POWER..=max).contains(&milliwatts) {
            debug!("Rejected power setting {milliwatts} mW, maximum is {max} mW");

            return Err(Error::OutOfRange);
        }

        let ack = self.intf.query(Command::SetPower(milliwatts), |fields| {
            record::parse_power(fields, "power setting")
        })?;

        info!("Power set to {ack} mW");

        Ok(ack)
    }

    fn set_output(&mut self, on: bool) -> Result<(), P::Error> {
        let ack = self
            .intf
            .query(Command::SetOutput(on), record::parse_switch)?;

        if ack == on {
            info!("Laser output switched {}", if on { "on" } else { "off" });

            Ok(())
        } else {
            Err(Error::MalformedResponse)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::TERMINATOR,
        record::{ControlMode, ErrorCode},
        tests::{MockPort, init_logger},
    };
    use alloc::{collections::vec_deque::VecDeque, format, string::String, vec::Vec};
    use core::time::Duration;
    use embedded_io::{ErrorKind, ErrorType};

    const INFO_RESPONSES: [&str; 9] = [
        "OK 11\r\n",
        "OK 12:30\r\n",
        "OK ACME Photonics\r\n",
        "OK MODEL123\r\n",
        "OK SN00042\r\n",
        "OK 1.2\r\n",
        "OK 405\r\n",
        "OK ACC APC\r\n",
        "OK ACC active\r\n",
    ];

    /// Simulated controller answering every complete command line.
    ///
    /// Settings are echoed back and stored, so later queries observe them.
    #[derive(Debug)]
    struct Simulator {
        power: f32,
        max_power: f32,
        output: bool,
        line: Vec<u8>,
        rx: VecDeque<u8>,
        log: Vec<String>,
    }

    impl Simulator {
        fn new(max_power: f32) -> Self {
            Self {
                power: 0.0,
                max_power,
                output: false,
                line: Vec::new(),
                rx: VecDeque::new(),
                log: Vec::new(),
            }
        }

        fn respond(&mut self, cmd: &str) -> String {
            if let Some(arg) = cmd.strip_prefix("P=") {
                self.power = arg.parse().unwrap_or(self.power);

                return format!("OK {arg}");
            }

            if let Some(arg) = cmd.strip_prefix("O=") {
                self.output = arg == "1";

                return format!("OK {arg}");
            }

            match cmd {
                "init" => "OK".into(),
                "S?" => format!("OK {:02X}", u8::from(self.output) | 0x10),
                "E?" => "OK 00".into(),
                "P?" => format!("OK {}", self.power),
                "LP?" => format!("OK {}", self.max_power),
                _ => "ERR".into(),
            }
        }
    }

    impl ErrorType for Simulator {
        type Error = ErrorKind;
    }

    impl Read for Simulator {
        fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
            if self.rx.is_empty() {
                return Err(ErrorKind::TimedOut);
            }

            let len = buf.len().min(self.rx.len());

            for (dst, src) in buf.iter_mut().zip(self.rx.drain(..len)) {
                *dst = src;
            }

            Ok(len)
        }
    }

    impl Write for Simulator {
        fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
            for &byte in buf {
                self.line.push(byte);

                if let Some(cmd) = self.line.strip_suffix(TERMINATOR) {
                    let cmd = String::from_utf8_lossy(cmd).into_owned();
                    let resp = self.respond(&cmd);

                    self.rx.extend(resp.bytes().chain(TERMINATOR.iter().copied()));
                    self.log.push(cmd);
                    self.line.clear();
                }
            }

            Ok(buf.len())
        }

        fn flush(&mut self) -> core::result::Result<(), Self::Error> {
            Ok(())
        }
    }

    fn connect(responses: &[&str]) -> (MockPort, usize) {
        let mut all = Vec::from(["OK\r\n"]);

        all.extend_from_slice(responses);

        (MockPort::new(&all), b"init\r\n".len())
    }

    #[test]
    fn connect_to_device() -> Result<(), ErrorKind> {
        init_logger();

        let mut port = MockPort::new(&["OK\r\n"]);

        {
            let laser = Laser::connect(&mut port)?;

            assert!(laser.is_open(), "connection should be open");
        }

        assert_eq!(port.tx, b"init\r\n", "written frames should be correct");

        Ok(())
    }

    #[test]
    fn query_device_info() -> Result<(), ErrorKind> {
        init_logger();

        let (mut port, _) = connect(&INFO_RESPONSES);
        let mut laser = Laser::connect(&mut port)?;
        let info = laser.query_device_info()?;

        assert_eq!(info.model, "MODEL123", "model should be correct");
        assert_eq!(info.serial_number, "SN00042", "serial number should be correct");
        assert_eq!(info.firmware, "1.2", "firmware should be correct");
        assert_eq!(
            info.manufacturer, "ACME Photonics",
            "manufacturer should be correct"
        );
        assert_eq!(info.wavelength, 405.0, "wavelength should be correct");
        assert_eq!(
            info.operating_time,
            Duration::from_secs(12 * 3600 + 30 * 60),
            "operating time should be correct"
        );
        assert_eq!(info.features, "ACC APC", "features should be correct");
        assert_eq!(info.control, ControlMode::Acc, "control mode should be correct");
        assert!(
            info.status.contains(Status::LaserOn | Status::TemperatureOk),
            "status should be correct"
        );

        drop(laser);

        assert_eq!(
            port.tx,
            b"init\r\nS?\r\nR?\r\nDM?\r\nDT?\r\nDS?\r\nDO?\r\nDW?\r\nDF?\r\nDC?\r\n",
            "written frames should be correct"
        );

        Ok(())
    }

    #[test]
    fn query_temperature() -> Result<(), ErrorKind> {
        init_logger();

        let (mut port, _) = connect(&["OK 253\r\n", "OK 150\r\n", "OK 35.0\r\n"]);
        let mut laser = Laser::connect(&mut port)?;
        let temp = laser.query_temperature()?;

        assert_eq!(
            temp,
            Temperature {
                current: 25.3,
                min: 15.0,
                max: 35.0
            },
            "temperature should be correct"
        );

        Ok(())
    }

    #[test]
    fn query_error() -> Result<(), ErrorKind> {
        init_logger();

        let (mut port, _) = connect(&["OK 40\r\n", "OK 00\r\n"]);
        let mut laser = Laser::connect(&mut port)?;
        let err = laser.query_error()?;

        assert_eq!(
            err.and_then(|err| err.kind),
            Some(ErrorCode::HeadCurrentHigh),
            "error should be correct"
        );
        assert_eq!(laser.query_error()?, None, "no error should be active");

        Ok(())
    }

    #[test]
    fn query_power_info() -> Result<(), ErrorKind> {
        init_logger();

        let (mut port, _) = connect(&["OK 12.5\r\n", "OK 50\r\n"]);
        let mut laser = Laser::connect(&mut port)?;
        let power = laser.query_power_info()?;

        assert_eq!(
            power,
            Power {
                current: 12.5,
                min: 0.0,
                max: 50.0
            },
            "power should be correct"
        );
        assert_eq!(power.ratio(), 0.25, "power ratio should be correct");

        Ok(())
    }

    #[test]
    fn query_snapshot() -> Result<(), ErrorKind> {
        init_logger();

        let mut responses = Vec::from(INFO_RESPONSES);

        responses.extend_from_slice(&[
            "OK 10\r\n",
            "OK 253\r\n",
            "OK 150\r\n",
            "OK 350\r\n",
            "OK 0\r\n",
            "OK 50\r\n",
            "OK 0\r\n",
        ]);

        let (mut port, _) = connect(&responses);
        let mut laser = Laser::connect(&mut port)?;
        let snapshot = laser.query_snapshot()?;

        assert_eq!(snapshot.info.model, "MODEL123", "model should be correct");
        assert_eq!(snapshot.status, Status::TemperatureOk, "status should be correct");
        assert_eq!(snapshot.temperature.current, 25.3, "temperature should be correct");
        assert_eq!(snapshot.power.max, 50.0, "maximum power should be correct");
        assert_eq!(snapshot.error, None, "no error should be active");

        Ok(())
    }

    #[test]
    fn set_power() -> Result<(), ErrorKind> {
        init_logger();

        let (mut port, init_len) = connect(&["OK 50\r\n", "OK 12.5\r\n"]);
        let mut laser = Laser::connect(&mut port)?;
        let ack = laser.set_power(12.5)?;

        assert_eq!(ack, 12.5, "acknowledged power should be correct");

        drop(laser);

        assert_eq!(
            &port.tx[init_len..],
            b"LP?\r\nP=12.5\r\n",
            "written frames should be correct"
        );

        Ok(())
    }

    #[test]
    fn enable_disable() -> Result<(), ErrorKind> {
        init_logger();

        let mut sim = Simulator::new(50.0);
        let mut laser = Laser::connect(&mut sim)?;

        laser.enable()?;

        assert!(
            laser.query_status()?.contains(Status::LaserOn),
            "laser should be on"
        );

        laser.set_power(20.0)?;
        laser.disable()?;

        assert!(
            !laser.query_status()?.contains(Status::LaserOn),
            "laser should be off"
        );
        assert_eq!(laser.query_power()?, 0.0, "power should be reset");

        drop(laser);

        assert_eq!(
            sim.log,
            [
                "init", "LP?", "P=0", "O=1", "S?", "P=20", "P=0", "O=0", "S?", "P?"
            ],
            "command sequence should be correct"
        );

        Ok(())
    }

    #[test]
    fn settings_round_trip() -> Result<(), ErrorKind> {
        init_logger();

        let mut sim = Simulator::new(100.0);
        let mut laser = Laser::connect(&mut sim)?;

        for milliwatts in [0.0, 0.5, 12.25, 42.0, 99.875, 100.0] {
            assert_eq!(
                laser.set_power(milliwatts)?,
                milliwatts,
                "echoed power should match"
            );
            assert_eq!(
                laser.query_power()?,
                milliwatts,
                "queried power should match"
            );
        }

        Ok(())
    }

    #[test]
    fn error_out_of_range() -> Result<(), ErrorKind> {
        init_logger();

        let (mut port, init_len) = connect(&["OK 50\r\n"]);
        let mut laser = Laser::connect(&mut port)?;

        assert_eq!(laser.query_max_power()?, 50.0, "maximum power should be correct");
        assert_eq!(
            laser.set_power(50.5),
            Err(Error::OutOfRange),
            "result should be out of range error"
        );
        assert_eq!(
            laser.set_power(-1.0),
            Err(Error::OutOfRange),
            "result should be out of range error"
        );
        assert_eq!(
            laser.set_power(f32::NAN),
            Err(Error::OutOfRange),
            "result should be out of range error"
        );

        drop(laser);

        assert_eq!(
            &port.tx[init_len..],
            b"LP?\r\n",
            "no setting should be written"
        );

        Ok(())
    }

    #[test]
    fn error_connection_closed() -> Result<(), ErrorKind> {
        init_logger();

        let (mut port, init_len) = connect(&["OK 11\r\n"]);
        let mut laser = Laser::connect(&mut port)?;

        laser.close()?;

        assert!(!laser.is_open(), "connection should be closed");
        assert_eq!(
            laser.query_status(),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );
        assert_eq!(
            laser.query_device_info(),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );
        assert_eq!(
            laser.query_temperature(),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );
        assert_eq!(
            laser.query_error(),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );
        assert_eq!(
            laser.query_power_info(),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );
        assert_eq!(
            laser.query_max_power(),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );
        assert_eq!(
            laser.set_power(1.0),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );
        assert_eq!(
            laser.enable(),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );
        assert_eq!(
            laser.disable(),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );
        assert_eq!(
            laser.close(),
            Err(Error::ConnectionClosed),
            "result should be connection closed error"
        );

        drop(laser);

        assert_eq!(port.tx.len(), init_len, "nothing should be written after init");
        assert_eq!(port.rx.len(), 7, "nothing should be read after init");

        Ok(())
    }

    #[test]
    fn error_timeout() {
        init_logger();

        let (mut port, _) = connect(&["OK 1"]);
        let res = Laser::connect(&mut port).and_then(|mut laser| laser.query_status());

        assert_eq!(res, Err(Error::Timeout), "result should be timeout error");
    }

    #[test]
    fn error_malformed_response() {
        init_logger();

        let (mut port, _) = connect(&["OK\r\n"]);
        let res = Laser::connect(&mut port).and_then(|mut laser| laser.query_power());

        assert_eq!(
            res,
            Err(Error::MalformedResponse),
            "result should be malformed response error"
        );
    }

    #[test]
    fn error_switch_not_confirmed() {
        init_logger();

        let (mut port, _) = connect(&["OK 50\r\n", "OK 0\r\n", "OK 0\r\n"]);
        let res = Laser::connect(&mut port).and_then(|mut laser| laser.enable());

        assert_eq!(
            res,
            Err(Error::MalformedResponse),
            "result should be malformed response error"
        );
    }
}
