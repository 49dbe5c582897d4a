//! Native serial port support for [`Interface`](crate::Interface) and [`Laser`](crate::Laser).
//!
//! Uses the [`serial2`](https://crates.io/crates/serial2) crate.

extern crate std;

use crate::Error;
use core::time::Duration;
use embedded_io::ErrorType;
use embedded_io_adapters::std::FromStd;
use log::debug;
use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

/// Default baud rate of the controller's serial interface.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Default read and write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Serial port type implementing [`Read`](embedded_io::Read)
/// and [`Write`](embedded_io::Write).
pub type Port = FromStd<SerialPort>;

/// Port-specific error type to be used as `E` for the generic [`Error<E>`] type.
pub type PortError = <Port as ErrorType>::Error;

/// Opens a native serial port at the given path.
///
/// The port is configured for 8 data bits, no parity, one stop bit and no flow control.
/// Reads that do not complete within `timeout` fail with [`Error::Timeout`].
///
/// Returns a [`Port`] that can be passed to [`Laser::connect`](crate::Laser::connect).
///
/// # Errors
///
/// - [`Error::Connection`] if the port cannot be opened or configured.
pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Port, Error<PortError>> {
    let mut port = SerialPort::open(path, |mut settings: Settings| {
        settings.set_raw();
        settings.set_baud_rate(baud_rate)?;
        settings.set_char_size(CharSize::Bits8);
        settings.set_stop_bits(StopBits::One);
        settings.set_parity(Parity::None);
        settings.set_flow_control(FlowControl::None);

        Ok(settings)
    })
    .map_err(Error::Connection)?;

    port.set_read_timeout(timeout).map_err(Error::Connection)?;
    port.set_write_timeout(timeout).map_err(Error::Connection)?;
    port.discard_buffers().map_err(Error::Connection)?;

    debug!("Opened serial port {path} at {baud_rate} baud");

    Ok(FromStd::new(port))
}
