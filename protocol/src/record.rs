//! Typed records and the parsers producing them from response fields.
//!
//! Each parser receives the fields decoded by [`codec::decode`](crate::codec::decode)
//! for one response and fails with [`Error::FieldParse`] naming the field
//! that could not be converted.

use crate::{Error, Result};
use alloc::{
    format,
    string::{String, ToString},
};
use bitflags_derive::{FlagsDebug, FlagsDisplay};
use core::{
    fmt::{Display, Formatter},
    time::Duration,
};
use strum::{Display, FromRepr};

/// Valid range of temperature readings in °C.
const TEMPERATURE_RANGE: core::ops::RangeInclusive<f32> = -100.0..=200.0;

bitflags::bitflags! {
    /// Controller status flags.
    ///
    /// Bits without a named flag are retained but not interpreted.
    #[derive(FlagsDisplay, FlagsDebug, PartialEq, Eq, Copy, Clone)]
    pub struct Status: u16 {
        /// Laser emission is switched on.
        const LaserOn = 0x0001;
        /// Safety interlock is open.
        const InterlockOpen = 0x0004;
        /// An error is active, see [`LaserError`].
        const Error = 0x0008;
        /// Laser head temperature is within its limits.
        const TemperatureOk = 0x0010;
    }
}

impl Status {
    /// Returns the bits of the status word that have no named flag.
    #[must_use]
    pub const fn unknown_bits(self) -> u16 {
        self.bits() & !Self::all().bits()
    }
}

bitflags::bitflags! {
    /// Active control loops of the laser driver.
    #[derive(FlagsDisplay, FlagsDebug, PartialEq, Eq, Copy, Clone)]
    pub struct ControlMode: u8 {
        /// Automatic current control.
        const Acc = 0x01;
        /// Automatic power control.
        const Apc = 0x02;
    }
}

/// Error code reported by the controller.
#[derive(FromRepr, Display, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum ErrorCode {
    /// Laser head temperature above the upper limit.
    #[strum(to_string = "Temperature of laser head is too high")]
    HeadTemperatureHigh = 0x01,
    /// Laser head temperature below the lower limit.
    #[strum(to_string = "Temperature of laser head is too low")]
    HeadTemperatureLow = 0x02,
    /// Temperature sensor disconnected.
    #[strum(to_string = "Temperature sensor connection is broken")]
    SensorBroken = 0x04,
    /// Temperature sensor cable short circuit.
    #[strum(to_string = "Temperature sensor cable is shorted")]
    SensorShorted = 0x08,
    /// Laser head current above its limit.
    #[strum(to_string = "Current for laser head is too high")]
    HeadCurrentHigh = 0x40,
    /// Internal fault preventing activation.
    #[strum(to_string = "Internal error - laser system cannot be activated")]
    Internal = 0x80,
}

/// Active error of the controller.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct LaserError {
    /// Raw error code.
    pub code: u8,
    /// Known error code, if the raw code is documented.
    pub kind: Option<ErrorCode>,
    /// Human-readable description.
    pub description: String,
}

impl LaserError {
    /// Looks up the description of a raw error code.
    ///
    /// Undocumented codes are described as unknown instead of failing.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        let kind = ErrorCode::from_repr(code);
        let description = match kind {
            Some(kind) => kind.to_string(),
            None => format!("Unknown error: 0x{code:02X}"),
        };

        Self {
            code,
            kind,
            description,
        }
    }
}

impl Display for LaserError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} (0x{:02X})", self.description, self.code)
    }
}

/// Laser head temperature readings in °C.
#[derive(PartialEq, Copy, Clone, Debug)]
pub struct Temperature {
    /// Current temperature.
    pub current: f32,
    /// Lower temperature limit.
    pub min: f32,
    /// Upper temperature limit.
    pub max: f32,
}

impl Display for Temperature {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:.1} °C (limits {:.1} to {:.1} °C)",
            self.current, self.min, self.max
        )
    }
}

/// Output power readings in mW.
#[derive(PartialEq, Copy, Clone, Debug)]
pub struct Power {
    /// Current power setting.
    pub current: f32,
    /// Minimum power setting.
    pub min: f32,
    /// Maximum power setting.
    pub max: f32,
}

impl Power {
    /// Returns the current setting as a fraction of the maximum, between 0 and 1.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.max > 0.0 {
            (f64::from(self.current) / f64::from(self.max)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Display for Power {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2} / {:.2} mW", self.current, self.max)
    }
}

/// Identification and configuration of the controller.
#[derive(PartialEq, Clone, Debug)]
pub struct DeviceInfo {
    /// Manufacturer name.
    pub manufacturer: String,
    /// Device (model) name.
    pub model: String,
    /// Serial number.
    pub serial_number: String,
    /// Software (firmware) version.
    pub firmware: String,
    /// Emission wavelength in nm.
    pub wavelength: f32,
    /// Total operating time, with minute resolution.
    pub operating_time: Duration,
    /// Available features, as reported.
    pub features: String,
    /// Active control loops.
    pub control: ControlMode,
    /// Status at the time of the query.
    pub status: Status,
}

/// Parses the acknowledgement of a command without payload.
pub fn parse_ack<E>(fields: &[&str]) -> Result<(), E> {
    if fields.is_empty() {
        Ok(())
    } else {
        Err(Error::MalformedResponse)
    }
}

/// Parses a hexadecimal status word.
///
/// Parsing the same word always yields the same flags.
pub fn parse_status<E>(fields: &[&str]) -> Result<Status, E> {
    let bits = parse_hex(single(fields)?).ok_or(Error::FieldParse("status"))?;

    Ok(Status::from_bits_retain(bits))
}

/// Parses a hexadecimal error code.
///
/// Returns `None` if no error is active (code zero).
pub fn parse_error<E>(fields: &[&str]) -> Result<Option<LaserError>, E> {
    let code: u8 = parse_hex(single(fields)?)
        .and_then(|code| code.try_into().ok())
        .ok_or(Error::FieldParse("error code"))?;

    Ok((code != 0).then(|| LaserError::from_code(code)))
}

/// Parses a temperature reading in °C.
///
/// Integer readings are tenths of a degree, e.g. `253` is 25.3 °C.
/// Readings with a decimal point are degrees.
pub fn parse_temperature<E>(fields: &[&str], name: &'static str) -> Result<f32, E> {
    let field = single(fields)?;
    let celsius = if field.contains('.') {
        field.parse::<f32>().ok()
    } else {
        field
            .parse::<i16>()
            .ok()
            .map(|tenths| f32::from(tenths) / 10.0)
    };

    celsius
        .filter(|val| TEMPERATURE_RANGE.contains(val))
        .ok_or(Error::FieldParse(name))
}

/// Parses a power reading or setting in mW.
pub fn parse_power<E>(fields: &[&str], name: &'static str) -> Result<f32, E> {
    single(fields)?
        .parse::<f32>()
        .ok()
        .filter(|val| val.is_finite() && *val >= 0.0)
        .ok_or(Error::FieldParse(name))
}

/// Parses the emission wavelength in nm.
pub fn parse_wavelength<E>(fields: &[&str]) -> Result<f32, E> {
    single(fields)?
        .parse::<f32>()
        .ok()
        .filter(|val| val.is_finite() && *val > 0.0)
        .ok_or(Error::FieldParse("wavelength"))
}

/// Parses an operating time given as `h:mm`.
pub fn parse_operating_time<E>(fields: &[&str]) -> Result<Duration, E> {
    let secs = single(fields)?
        .split_once(':')
        .and_then(|(hours, mins)| Some((hours.parse::<u64>().ok()?, mins.parse::<u64>().ok()?)))
        .filter(|(_, mins)| *mins < 60)
        .and_then(|(hours, mins)| hours.checked_mul(60)?.checked_add(mins)?.checked_mul(60))
        .ok_or(Error::FieldParse("operating time"))?;

    Ok(Duration::from_secs(secs))
}

/// Parses a free-text field.
pub fn parse_text<E>(fields: &[&str]) -> Result<String, E> {
    Ok(single(fields)?.to_string())
}

/// Parses the active control loops from their textual description.
///
/// The description mentions `ACC` and/or `APC` for each active loop.
pub fn parse_control_mode<E>(fields: &[&str]) -> Result<ControlMode, E> {
    let text = single(fields)?;
    let mut mode = ControlMode::empty();

    mode.set(ControlMode::Acc, text.contains("ACC"));
    mode.set(ControlMode::Apc, text.contains("APC"));

    Ok(mode)
}

/// Parses the echoed state of the laser output switch.
pub fn parse_switch<E>(fields: &[&str]) -> Result<bool, E> {
    match single(fields)? {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(Error::FieldParse("output")),
    }
}

/// Returns the only field of a single-value response.
fn single<'a, E>(fields: &[&'a str]) -> Result<&'a str, E> {
    match fields {
        [field] => Ok(*field),
        _ => Err(Error::MalformedResponse),
    }
}

/// Parses a hexadecimal number with optional `0x` prefix.
fn parse_hex(field: &str) -> Option<u16> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);

    u16::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;
    use core::convert::Infallible;

    #[test]
    fn status() -> Result<(), Infallible> {
        init_logger();

        let status = parse_status(&["1F"])?;

        assert!(
            status.contains(
                Status::LaserOn | Status::InterlockOpen | Status::Error | Status::TemperatureOk
            ),
            "status flags should be correct"
        );
        assert_eq!(status.unknown_bits(), 0x0002, "unknown bits should be retained");
        assert_eq!(
            parse_status::<Infallible>(&["0x10"])?,
            Status::TemperatureOk,
            "prefixed word should be accepted"
        );

        Ok(())
    }

    #[test]
    fn status_idempotent() -> Result<(), Infallible> {
        init_logger();

        let high_words = [0x0100, 0x8001, 0xa5ff, 0xfffe, 0xffff];

        for bits in (0..=0xffu16).chain(high_words) {
            let word = format!("{bits:02X}");
            let first = parse_status::<Infallible>(&[word.as_str()])?;
            let second = parse_status::<Infallible>(&[word.as_str()])?;

            assert_eq!(first, second, "parsing should be idempotent");
            assert_eq!(first.bits(), bits, "all bits should be retained");
        }

        let status = parse_status::<Infallible>(&["8001"])?;

        assert!(status.contains(Status::LaserOn), "laser flag should be set");
        assert_eq!(status.unknown_bits(), 0x8000, "high bit should be retained");

        Ok(())
    }

    #[test]
    fn error_codes() -> Result<(), Infallible> {
        init_logger();

        let table = [
            (0x01, "Temperature of laser head is too high"),
            (0x02, "Temperature of laser head is too low"),
            (0x04, "Temperature sensor connection is broken"),
            (0x08, "Temperature sensor cable is shorted"),
            (0x40, "Current for laser head is too high"),
            (0x80, "Internal error - laser system cannot be activated"),
        ];

        for (code, description) in table {
            let word = format!("{code:02X}");
            let err = parse_error::<Infallible>(&[word.as_str()])?;

            assert_eq!(
                err.map(|err| err.description),
                Some(description.to_string()),
                "description should be correct"
            );
        }

        Ok(())
    }

    #[test]
    fn error_code_unknown() -> Result<(), Infallible> {
        init_logger();

        let err = parse_error::<Infallible>(&["20"])?;

        assert_eq!(
            err,
            Some(LaserError {
                code: 0x20,
                kind: None,
                description: "Unknown error: 0x20".to_string(),
            }),
            "unknown code should be described as unknown"
        );
        assert_eq!(
            parse_error::<Infallible>(&["00"])?,
            None,
            "zero code should mean no error"
        );

        Ok(())
    }

    #[test]
    fn temperature() -> Result<(), Infallible> {
        init_logger();

        assert_eq!(
            parse_temperature::<Infallible>(&["253"], "temperature")?,
            25.3,
            "tenths should be scaled"
        );
        assert_eq!(
            parse_temperature::<Infallible>(&["-52"], "temperature")?,
            -5.2,
            "negative tenths should be scaled"
        );
        assert_eq!(
            parse_temperature::<Infallible>(&["25.3"], "temperature")?,
            25.3,
            "degrees should be kept"
        );

        Ok(())
    }

    #[test]
    fn operating_time() -> Result<(), Infallible> {
        init_logger();

        assert_eq!(
            parse_operating_time::<Infallible>(&["12:34"])?,
            Duration::from_secs(12 * 3600 + 34 * 60),
            "operating time should be correct"
        );

        Ok(())
    }

    #[test]
    fn control_mode() -> Result<(), Infallible> {
        init_logger();

        assert_eq!(
            parse_control_mode::<Infallible>(&["ACC active"])?,
            ControlMode::Acc,
            "control mode should be correct"
        );
        assert_eq!(
            parse_control_mode::<Infallible>(&["ACC/APC"])?,
            ControlMode::Acc | ControlMode::Apc,
            "control mode should be correct"
        );
        assert_eq!(
            parse_control_mode::<Infallible>(&["none"])?,
            ControlMode::empty(),
            "control mode should be correct"
        );

        Ok(())
    }

    #[test]
    fn error_field_parse() {
        init_logger();

        assert_eq!(
            parse_status::<Infallible>(&["XYZ"]),
            Err(Error::FieldParse("status")),
            "non-hex status should be rejected"
        );
        assert_eq!(
            parse_error::<Infallible>(&["100"]),
            Err(Error::FieldParse("error code")),
            "oversized error code should be rejected"
        );
        assert_eq!(
            parse_temperature::<Infallible>(&["hot"], "temperature"),
            Err(Error::FieldParse("temperature")),
            "non-numeric temperature should be rejected"
        );
        assert_eq!(
            parse_temperature::<Infallible>(&["2500"], "temperature"),
            Err(Error::FieldParse("temperature")),
            "out-of-range temperature should be rejected"
        );
        assert_eq!(
            parse_power::<Infallible>(&["-1.0"], "power"),
            Err(Error::FieldParse("power")),
            "negative power should be rejected"
        );
        assert_eq!(
            parse_power::<Infallible>(&["NaN"], "power"),
            Err(Error::FieldParse("power")),
            "non-finite power should be rejected"
        );
        assert_eq!(
            parse_wavelength::<Infallible>(&["0"]),
            Err(Error::FieldParse("wavelength")),
            "zero wavelength should be rejected"
        );
        assert_eq!(
            parse_operating_time::<Infallible>(&["12:75"]),
            Err(Error::FieldParse("operating time")),
            "invalid minutes should be rejected"
        );
        assert_eq!(
            parse_operating_time::<Infallible>(&["1000000000000000000:00"]),
            Err(Error::FieldParse("operating time")),
            "overflowing hours should be rejected"
        );
        assert_eq!(
            parse_switch::<Infallible>(&["2"]),
            Err(Error::FieldParse("output")),
            "invalid switch state should be rejected"
        );
    }

    #[test]
    fn error_field_count() {
        init_logger();

        assert_eq!(
            parse_status::<Infallible>(&[]),
            Err(Error::MalformedResponse),
            "missing field should be rejected"
        );
        assert_eq!(
            parse_ack::<Infallible>(&["1"]),
            Err(Error::MalformedResponse),
            "unexpected field should be rejected"
        );
    }
}
