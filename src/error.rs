use core::fmt::{self, Debug, Display};

mod private {
    #[derive(Debug)]
    pub enum Private {}
}

/// The error type used by this library.
///
/// This can encapsulate an I2C bus error, and adds its own protocol errors
/// on top of that.
pub enum Error<E> {
    /// An I2C transaction was not acknowledged or otherwise failed.
    I2c(E),

    /// The logger reported that its SD card is not initialized.
    ///
    /// This can happen when no card is inserted, the card failed to mount,
    /// or the wrong device is attached at the configured address.
    SdCardNotReady,

    /// A command line (keyword, arguments and escape prefix) did not fit in
    /// a single bus transaction.
    CommandTooLong,

    #[doc(hidden)]
    __NonExhaustive(private::Private),
}

impl<E: Debug> Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(i2c) => write!(f, "Error::I2c({:?})", i2c),
            Error::SdCardNotReady => f.write_str("Error::SdCardNotReady"),
            Error::CommandTooLong => f.write_str("Error::CommandTooLong"),
            Error::__NonExhaustive(_) => unreachable!(),
        }
    }
}

impl<E: Display> Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(i2c) => write!(f, "I2C error: {}", i2c),
            Error::SdCardNotReady => f.write_str("SD card not initialized"),
            Error::CommandTooLong => f.write_str("command exceeds the bus transfer limit"),
            Error::__NonExhaustive(_) => unreachable!(),
        }
    }
}
