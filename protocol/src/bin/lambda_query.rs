use clap::{Parser, Subcommand};
use lambda_mini::{
    Laser,
    serial::{self, DEFAULT_BAUD_RATE},
};
use std::{error::Error, time::Duration};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port path
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Baud rate of the serial port
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Read timeout in milliseconds
    #[arg(short, long, default_value = "1000")]
    timeout_ms: u64,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print device identification and configuration
    Info,
    /// Print status flags
    Status,
    /// Print temperature readings
    Temperature,
    /// Print the active error
    Error,
    /// Print power readings
    Power,
    /// Switch the laser output on (at zero power)
    Enable,
    /// Switch the laser output off
    Disable,
    /// Set the output power
    SetPower {
        /// Power in mW
        milliwatts: f32,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let port = serial::open(
        &args.port,
        args.baud,
        Duration::from_millis(args.timeout_ms),
    )?;
    let mut laser = Laser::connect(port)?;

    match args.action {
        Action::Info => {
            let info = laser.query_device_info()?;

            println!("Manufacturer: {}", info.manufacturer);
            println!("Model: {}", info.model);
            println!("Serial number: {}", info.serial_number);
            println!("Firmware: {}", info.firmware);
            println!("Wavelength: {} nm", info.wavelength);
            println!(
                "Operating time: {} h",
                info.operating_time.as_secs() / 3600
            );
            println!("Features: {}", info.features);
            println!("Control mode: {}", info.control);
        }
        Action::Status => println!("Status: {}", laser.query_status()?),
        Action::Temperature => println!("Temperature: {}", laser.query_temperature()?),
        Action::Error => match laser.query_error()? {
            Some(err) => println!("Error: {err}"),
            None => println!("No error"),
        },
        Action::Power => println!("Power: {}", laser.query_power_info()?),
        Action::Enable => {
            laser.enable()?;
            println!("Laser enabled");
        }
        Action::Disable => {
            laser.disable()?;
            println!("Laser disabled");
        }
        Action::SetPower { milliwatts } => {
            println!("Power set to {} mW", laser.set_power(milliwatts)?);
        }
    }

    laser.close()?;

    Ok(())
}
