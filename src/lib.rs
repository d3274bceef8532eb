//! An [`embedded-hal`]-based driver for the Qwiic OpenLog, an I2C microSD
//! data logger.
//!
//! The OpenLog speaks a short ASCII command protocol over the bus: the host
//! sends lines like `append log1.txt` or `rm -rf data`, then reads back
//! small fixed-size or NUL-delimited responses. This crate formats those
//! commands, drives the bus, and decodes the responses into typed results.
//!
//! Everything written to the device after [`OpenLog::append`] or
//! [`OpenLog::create`] is recorded to the open file, so the driver also
//! implements [`core::fmt::Write`] for plain text logging:
//!
//! ```ignore
//! use core::fmt::Write;
//! use qwiic_openlog::{openlog, OpenLog};
//!
//! let mut log = OpenLog::init(i2c, openlog::DEFAULT_ADDRESS)?;
//! log.append("sensors.txt")?;
//! writeln!(log, "vbat = {}", vbat).ok();
//! ```
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal/

#![doc(html_root_url = "https://docs.rs/qwiic-openlog/0.1.0")]
#![warn(missing_debug_implementations, rust_2018_idioms)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;
mod error;
pub mod openlog;
mod utils;

pub use crate::error::Error;
pub use crate::openlog::{FirmwareVersion, OpenLog, Status};
