//! Control lambda mini laser-diode controllers via their serial command interface.
//!
//! # Overview
//!
//! The `lambda_mini` crate implements the ASCII command protocol spoken by
//! lambda mini controllers. It offers a synchronous, platform-agnostic API
//! built on the blocking [`embedded_io`] traits.
//!
//! Depending on your needs, you can:
//!
//! - Use the high-level [`Laser`] facade to query typed records and switch the laser.
//! - Work directly with the low-level [`Interface`] and the [`codec`] module.
//!
//! # Getting started
//!
//! The controller exposes a serial port configured as follows:
//!
//! - **Baud rate:** 57600
//! - **Parity:** None
//! - **Data bits:** 8
//! - **Stop bits:** 1
//!
//! If you enable the `native-serial` feature, you can obtain a compatible
//! serial port instance using [`serial::open`]:
//!
//! ```no_run
//! # fn main() -> lambda_mini::Result<(), lambda_mini::serial::PortError> {
//! use lambda_mini::serial::{self, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};
//!
//! let port = serial::open("/dev/ttyUSB0", DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Examples
//!
//! ## Querying the controller using the [`Laser`] facade
//!
//! ```no_run
//! # fn main() -> lambda_mini::Result<(), lambda_mini::serial::PortError> {
//! # use lambda_mini::serial::{self, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};
//! # let port = serial::open("/dev/ttyUSB0", DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT)?;
//! let mut laser = lambda_mini::Laser::connect(port)?;
//!
//! println!("Status: {}", laser.query_status()?);
//! println!("Temperature: {}", laser.query_temperature()?);
//!
//! laser.enable()?;
//! laser.set_power(12.5)?;
//! laser.disable()?;
//! laser.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Low-level access using [`Interface`]
//!
//! ```no_run
//! # fn main() -> lambda_mini::Result<(), lambda_mini::serial::PortError> {
//! # use lambda_mini::serial::{self, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};
//! # let port = serial::open("/dev/ttyUSB0", DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT)?;
//! use lambda_mini::{Interface, codec::Command, record};
//!
//! let mut intf = Interface::new(port);
//! let status = intf.query(Command::Status, record::parse_status)?;
//!
//! println!("Status: {status}");
//! # Ok(())
//! # }
//! ```
//!
//! # Protocol details
//!
//! Every command is a line of ASCII text terminated by `\r\n`.
//! The controller answers every command with exactly one line:
//! an acknowledgement token followed by the payload fields, separated by whitespace.
//! The response carries no tag identifying the command it answers,
//! so decoding always needs the [`codec::Command`] that was sent.

#![no_std]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod codec;
pub mod laser;
pub mod record;

#[cfg(feature = "native-serial")]
#[cfg_attr(docsrs, doc(cfg(feature = "native-serial")))]
pub mod serial;

pub use embedded_io;
pub use laser::Laser;

use crate::codec::{Command, TERMINATOR};
use alloc::vec::Vec;
use core::fmt::{Display, Formatter};
use embedded_io::{Error as _, ErrorKind, Read, ReadExactError, Write};
use log::{debug, trace};

/// Maximum accepted length of a response line, including its terminator.
pub const MAX_LINE_LEN: usize = 256;

/// A specialized [`Result`] type for protocol operations.
///
/// Uses [`Error<E>`] as the error variant, which can include port-specific errors.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error type for protocol operations.
///
/// The generic parameter `E` allows the error type to carry a port-specific error.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Error<E> {
    /// The port could not be opened.
    Connection(E),
    /// The connection was closed before the operation.
    ConnectionClosed,
    /// The device did not finish its response within the port's read timeout.
    Timeout,
    /// The response line is not terminated correctly or has the wrong number of fields.
    MalformedResponse,
    /// A response field could not be converted to its expected type or range.
    ///
    /// Contains the name of the offending field.
    FieldParse(&'static str),
    /// The requested value is outside the range supported by the device.
    OutOfRange,
    /// The port encountered an unexpected end-of-file.
    UnexpectedEof,
    /// A port-specific input/output error.
    Io(E),
}

impl<E: core::error::Error> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::Connection(err) => write!(f, "failed to open connection: {err}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Timeout => write!(f, "timed out waiting for response"),
            Self::MalformedResponse => write!(f, "malformed response"),
            Self::FieldParse(field) => write!(f, "invalid value for field '{field}'"),
            Self::OutOfRange => write!(f, "value out of range"),
            Self::UnexpectedEof => write!(f, "unexpected end-of-file"),
            Self::Io(err) => write!(f, "input/output error: {err}"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for Error<E> {}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Io(err)
    }
}

impl<E: embedded_io::Error> From<ReadExactError<E>> for Error<E> {
    fn from(err: ReadExactError<E>) -> Self {
        match err {
            ReadExactError::UnexpectedEof => Self::UnexpectedEof,
            ReadExactError::Other(err) if err.kind() == ErrorKind::TimedOut => Self::Timeout,
            ReadExactError::Other(err) => Self::Io(err),
        }
    }
}

/// Synchronous command interface to a controller.
///
/// Requires a port that implements [`Read`] and [`Write`] for communication.
/// The read timeout of the port bounds every blocking read.
///
/// The interface is either open or closed.
/// [`Interface::close`] releases the port and is a one-way transition:
/// every operation on a closed interface fails with [`Error::ConnectionClosed`]
/// without touching the port.
///
/// A response that timed out or was cut off leaves the interface out of sync:
/// late or leftover bytes are still pending on the port.
/// Before the next command is written, pending input is read and discarded
/// until the port reports a read timeout, so every response is matched to
/// the command that requested it.
///
/// Most users should access the controller through [`Laser`].
/// [`Interface`] is intended for direct, low-level access to the command protocol.
#[derive(Debug)]
pub struct Interface<P> {
    port: Option<P>,
    out_of_sync: bool,
}

impl<P: Read + Write> Interface<P> {
    /// Constructs a new, open interface.
    pub fn new(port: P) -> Self {
        Self {
            port: Some(port),
            out_of_sync: false,
        }
    }

    /// Returns whether the interface is still open.
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Closes the interface, releasing the port.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the interface was already closed.
    pub fn close(&mut self) -> Result<(), P::Error> {
        self.port.take().ok_or(Error::ConnectionClosed)?;
        debug!("Connection closed");

        Ok(())
    }

    /// Sends a command and parses the fields of its response.
    ///
    /// The response is decoded according to the command's response shape
    /// before the fields are handed to `parse`.
    pub fn query<T>(
        &mut self,
        cmd: Command,
        parse: impl FnOnce(&[&str]) -> Result<T, P::Error>,
    ) -> Result<T, P::Error> {
        // Fail before encoding anything on a closed connection
        self.port_mut()?;
        self.discard_stale_input()?;

        self.write(&codec::encode(cmd))?;

        let line = self.read_line()?;
        let fields = codec::decode(cmd, &line)?;

        debug!("Response to {cmd:?}: {fields:?}");

        parse(&fields)
    }

    /// Writes the provided buffer to the port.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), P::Error> {
        let port = self.port_mut()?;

        trace!("Write to port: {}", buf.escape_ascii());
        port.write_all(buf)?;
        port.flush()?;

        Ok(())
    }

    /// Reads a single response line from the port, including its terminator.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the port's read timeout elapses before the line is complete.
    /// - [`Error::MalformedResponse`] if the line ends without the full terminator
    ///   or exceeds [`MAX_LINE_LEN`].
    pub fn read_line(&mut self) -> Result<Vec<u8>, P::Error> {
        let res = self.read_frame();

        if matches!(res, Err(Error::Timeout | Error::MalformedResponse)) {
            self.out_of_sync = true;
        }

        res
    }

    /// Returns whether stale input has to be discarded before the next command.
    pub fn is_out_of_sync(&self) -> bool {
        self.out_of_sync
    }

    /// Reads and discards pending input after a failed response.
    ///
    /// Does nothing while the interface is in sync.
    pub fn discard_stale_input(&mut self) -> Result<(), P::Error> {
        if !self.out_of_sync {
            return Ok(());
        }

        let port = self.port_mut()?;
        let mut buf = [0x00; 64];

        loop {
            match port.read(&mut buf) {
                Ok(0) => break,
                Ok(len) => trace!("Discarded stale input: {}", buf[..len].escape_ascii()),
                Err(err) if err.kind() == ErrorKind::TimedOut => break,
                Err(err) => return Err(Error::Io(err)),
            }
        }

        debug!("Interface back in sync");
        self.out_of_sync = false;

        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, P::Error> {
        let port = self.port_mut()?;
        let mut line = Vec::new();

        loop {
            let mut byte = [0x00];

            port.read_exact(&mut byte)?;
            line.push(byte[0]);

            if byte[0] == b'\n' {
                break;
            }

            if line.len() >= MAX_LINE_LEN {
                return Err(Error::MalformedResponse);
            }
        }

        trace!("Read from port: {}", line.escape_ascii());

        if line.ends_with(TERMINATOR) {
            Ok(line)
        } else {
            Err(Error::MalformedResponse)
        }
    }

    fn port_mut(&mut self) -> Result<&mut P, P::Error> {
        self.port.as_mut().ok_or(Error::ConnectionClosed)
    }
}
