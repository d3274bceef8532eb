
use log::{error, info};

use structopt::StructOpt;

pub use linux_embedded_hal::I2cdev;

use simplelog::{LevelFilter, TermLogger, TerminalMode};

use qwiic_openlog::OpenLog;

#[derive(Debug, PartialEq, StructOpt)]
struct Options {
    #[structopt(subcommand)]
    operation: Operations,

    /// I2C device
    #[structopt(long, default_value = "/dev/i2c-1", env = "I2C_DEV")]
    i2c_dev: String,

    /// 7-bit logger address
    #[structopt(long, default_value = "42", env = "I2C_ADDR")]
    address: u8,

    /// Configure log level
    #[structopt(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: LevelFilter,
}

#[derive(Debug, PartialEq, StructOpt)]
pub enum Operations {
    /// Read logger status and firmware version
    Info,
    /// List the contents of the working directory
    List {
        /// Wildcard pattern to match against
        #[structopt(default_value = "*")]
        pattern: String,
    },
    /// Read a file's contents
    Read {
        /// File to read
        file: String,

        /// Offset into the file
        #[structopt(long, default_value = "0")]
        offset: u16,

        /// Number of bytes to read, the whole file if omitted
        #[structopt(long)]
        length: Option<u32>,
    },
    /// Append text to a file, creating it if needed
    Append {
        /// File to append to
        file: String,

        /// Text to append
        text: String,
    },
    /// Append raw data to a file, creating it if needed
    Write {
        /// File to append to
        file: String,

        // Data to write in hexadecimal
        #[structopt(long)]
        data: HexData,
    },
    /// Remove a file, or a directory and its contents
    Remove {
        /// File or directory to remove, wildcards allowed
        target: String,

        /// Remove directories along with everything inside them
        #[structopt(long)]
        recursive: bool,
    },
    /// Create a directory inside the working directory
    Mkdir {
        /// Directory to create
        directory: String,
    },
    /// Change the working directory
    Chdir {
        /// Directory to change to
        directory: String,
    },
    /// Move the logger to a new I2C address
    SetAddress {
        /// New 7-bit address
        new_address: u8,
    },
}

#[derive(Debug, PartialEq)]
pub struct HexData(Vec<u8>);

impl std::str::FromStr for HexData {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(HexData)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    // Load options
    let opts = Options::from_args();

    // Setup logging
    TermLogger::init(opts.log_level, simplelog::Config::default(), TerminalMode::Mixed).unwrap();

    // Connect to the I2C bus
    let i2c = I2cdev::new(&opts.i2c_dev).unwrap();

    // Instantiate the logger driver, checking SD card state
    let mut logger = match OpenLog::init(i2c, opts.address) {
        Ok(l) => l,
        Err(e) => {
            error!("Error initialising logger: {:?}", e);
            return Ok(());
        }
    };

    // Perform the requested operation
    match &opts.operation {
        Operations::Info => {
            let version = logger.firmware_version().unwrap();
            let status = logger.status().unwrap();

            info!("Firmware {}, status {:?}", version, status);
        }
        Operations::List { pattern } => {
            logger.search_directory(pattern).unwrap();

            while let Some(item) = logger.next_directory_item().unwrap() {
                info!("{}", item);
            }
        }
        Operations::Read {
            file,
            offset,
            length,
        } => {
            let length = match length {
                Some(length) => *length,
                None => {
                    let size = logger.size(file).unwrap();
                    if size < 0 {
                        error!("No such file: {}", file);
                        return Ok(());
                    }
                    size as u32
                }
            };
            info!("Reading {} bytes from {} at offset {}", length, file, offset);

            let mut buff = vec![0u8; length as usize];
            logger.read_at(file, *offset, &mut buff).unwrap();

            info!("Read: {}", String::from_utf8_lossy(&buff));
        }
        Operations::Append { file, text } => {
            info!("Appending {} bytes to {}", text.len(), file);

            logger.append(file).unwrap();
            logger.write(text.as_bytes()).unwrap();

            info!("Append complete");
        }
        Operations::Write { file, data } => {
            info!("Writing {} bytes to {}", data.0.len(), file);

            logger.append(file).unwrap();
            logger.write(&data.0).unwrap();

            info!("Write complete");
        }
        Operations::Remove { target, recursive } => {
            info!("Removing {}", target);

            let removed = logger.remove(target, *recursive).unwrap();

            info!("Removed {} item(s)", removed);
        }
        Operations::Mkdir { directory } => {
            logger.make_directory(directory).unwrap();

            info!("Created {}", directory);
        }
        Operations::Chdir { directory } => {
            logger.change_directory(directory).unwrap();

            info!("Changed directory to {}", directory);
        }
        Operations::SetAddress { new_address } => {
            logger.set_address(*new_address).unwrap();

            info!("Logger moved to address {}", new_address);
        }
    }

    Ok(())
}
