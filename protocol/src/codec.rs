//! Command frame encoding and response frame decoding.
//!
//! Commands are plain ASCII lines. A query is a mnemonic ending in `?`,
//! a setting is a mnemonic ending in `=` followed by its argument.
//! Every frame is terminated by [`TERMINATOR`].
//!
//! A response frame consists of an acknowledgement token followed by the
//! payload fields, separated by ASCII whitespace.
//! The expected payload depends on the [`Command`] that was sent.
//!
//! The controller does not document the content of the acknowledgement token,
//! so any non-empty token is accepted. A rejected command therefore shows up
//! as a payload with the wrong field count or as a field that fails to parse.

use crate::{Error, Result};
use alloc::{format, vec, vec::Vec};
use core::str;
use log::trace;
use strum::IntoStaticStr;

/// Line terminator used by commands and responses.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Command understood by the controller.
///
/// Settings carry their argument.
#[derive(IntoStaticStr, PartialEq, Copy, Clone, Debug)]
pub enum Command {
    /// Initializes the controller's command interface.
    #[strum(serialize = "init")]
    Init,
    /// Queries the status word.
    #[strum(serialize = "S?")]
    Status,
    /// Queries the active error code.
    #[strum(serialize = "E?")]
    Error,
    /// Queries the current laser head temperature.
    #[strum(serialize = "T?")]
    Temperature,
    /// Queries the lower temperature limit.
    #[strum(serialize = "LTN?")]
    TemperatureMin,
    /// Queries the upper temperature limit.
    #[strum(serialize = "LTP?")]
    TemperatureMax,
    /// Queries the output power setting.
    #[strum(serialize = "P?")]
    Power,
    /// Queries the maximum output power.
    #[strum(serialize = "LP?")]
    MaxPower,
    /// Queries the total operating time.
    #[strum(serialize = "R?")]
    OperatingTime,
    /// Queries the manufacturer name.
    #[strum(serialize = "DM?")]
    Manufacturer,
    /// Queries the device (model) name.
    #[strum(serialize = "DT?")]
    DeviceName,
    /// Queries the serial number.
    #[strum(serialize = "DS?")]
    SerialNumber,
    /// Queries the software (firmware) version.
    #[strum(serialize = "DO?")]
    SoftwareVersion,
    /// Queries the emission wavelength.
    #[strum(serialize = "DW?")]
    Wavelength,
    /// Queries the available features.
    #[strum(serialize = "DF?")]
    Features,
    /// Queries the active control loops.
    #[strum(serialize = "DC?")]
    ControlMode,
    /// Switches the laser output on or off.
    #[strum(serialize = "O=")]
    SetOutput(bool),
    /// Sets the output power in mW.
    #[strum(serialize = "P=")]
    SetPower(f32),
}

/// Payload shape of a response frame.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Shape {
    /// Acknowledgement token only, no payload.
    Ack,
    /// A single whitespace-free value.
    Value,
    /// Free text spanning the rest of the line, returned as one field.
    Text,
}

impl Shape {
    /// Returns the number of payload fields of this shape.
    #[must_use]
    pub const fn field_count(self) -> usize {
        match self {
            Self::Ack => 0,
            Self::Value | Self::Text => 1,
        }
    }
}

impl Command {
    /// Returns the command mnemonic, without argument.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Returns the payload shape of the response to this command.
    #[must_use]
    pub const fn response_shape(self) -> Shape {
        match self {
            Self::Init => Shape::Ack,
            Self::Manufacturer
            | Self::DeviceName
            | Self::SerialNumber
            | Self::SoftwareVersion
            | Self::Features
            | Self::ControlMode => Shape::Text,
            // Settings echo their argument
            _ => Shape::Value,
        }
    }
}

/// Encodes a command into the frame expected by the controller.
#[must_use]
pub fn encode(cmd: Command) -> Vec<u8> {
    let mnemonic = cmd.mnemonic();
    let frame = match cmd {
        Command::SetOutput(on) => format!("{mnemonic}{}\r\n", u8::from(on)),
        Command::SetPower(milliwatts) => format!("{mnemonic}{milliwatts}\r\n"),
        _ => format!("{mnemonic}\r\n"),
    };

    trace!("Encoded {cmd:?}: {}", frame.escape_debug());

    frame.into_bytes()
}

/// Decodes a response frame into its payload fields.
///
/// The terminator and the acknowledgement token are stripped.
/// The token itself is not interpreted.
/// The number of remaining fields must match the response shape of `cmd`.
///
/// # Errors
///
/// - [`Error::MalformedResponse`] if the terminator or acknowledgement token is missing,
///   the frame is not valid UTF-8, or the field count does not match.
pub fn decode<E>(cmd: Command, frame: &[u8]) -> Result<Vec<&str>, E> {
    let line = frame
        .strip_suffix(TERMINATOR)
        .ok_or(Error::MalformedResponse)?;
    let line = str::from_utf8(line)
        .map_err(|_| Error::MalformedResponse)?
        .trim_ascii();
    let (ack, payload) = line
        .split_once(|c: char| c.is_ascii_whitespace())
        .map_or((line, ""), |(ack, payload)| (ack, payload.trim_ascii_start()));

    if ack.is_empty() {
        return Err(Error::MalformedResponse);
    }

    let fields = match cmd.response_shape() {
        Shape::Text if payload.is_empty() => Vec::new(),
        Shape::Text => vec![payload],
        Shape::Ack | Shape::Value => payload.split_ascii_whitespace().collect(),
    };

    if fields.len() == cmd.response_shape().field_count() {
        Ok(fields)
    } else {
        Err(Error::MalformedResponse)
    }
}
