//! Driver for the Qwiic OpenLog I2C microSD data logger.

use crate::utils::AsciiSlice;
use crate::Error;
use bitflags::bitflags;
use core::fmt;
use embedded_hal::blocking::i2c::{Read, Write};

/// The logger's factory-default 7-bit I2C address.
pub const DEFAULT_ADDRESS: u8 = 0x2A;

/// Maximum number of bytes carried by a single bus transaction.
///
/// The logger's bus peripheral buffers 32 bytes per transfer, so command
/// lines must fit in one transaction and bulk data is moved in chunks of
/// this size.
pub const I2C_BUFFER_LENGTH: usize = 32;

/// Escape character the logger listens for to drop out of logging mode.
const DEFAULT_ESCAPE_CHARACTER: u8 = 26;

bitflags! {
    /// Contents of the logger's status byte.
    ///
    /// The logger refreshes it after every command; [`OpenLog::status`]
    /// always reads it from the device rather than caching it. Bits 5-7 are
    /// reserved.
    pub struct Status: u8 {
        /// The SD card is present and initialized.
        const SD_INIT_GOOD = 1 << 0;
        /// The most recent command completed successfully.
        const LAST_COMMAND_SUCCEEDED = 1 << 1;
        /// The most recent command was recognized.
        const LAST_COMMAND_KNOWN = 1 << 2;
        /// A file is open and receiving appended data.
        const FILE_OPEN = 1 << 3;
        /// The working directory is the card's root directory.
        const IN_ROOT_DIRECTORY = 1 << 4;
    }
}

/// Firmware version reported by the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    major: u8,
    minor: u8,
}

impl FirmwareVersion {
    /// The major version number.
    pub fn major(&self) -> u8 {
        self.major
    }

    /// The minor version number.
    pub fn minor(&self) -> u8 {
        self.minor
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Progress of a directory enumeration started with
/// [`OpenLog::search_directory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingState {
    Idle,
    Listing,
}

/// A command line being assembled for transmission.
///
/// Commands are an ASCII keyword plus up to two space separated arguments,
/// preceded by the configured escape run. The whole line must fit in one
/// bus transaction.
struct CommandLine {
    buf: [u8; I2C_BUFFER_LENGTH],
    len: usize,
}

impl CommandLine {
    fn new() -> Self {
        Self {
            buf: [0; I2C_BUFFER_LENGTH],
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), fmt::Error> {
        if self.len == self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for CommandLine {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Driver for the Qwiic OpenLog data logger.
///
/// # Type Parameters
///
/// * **`I2C`**: The I2C master the logger is attached to. The caller is
///   responsible for configuring the bus before handing it over.
///
/// The driver is fully blocking and assumes exclusive access to the device:
/// it issues one transaction at a time and never retries. Callers that need
/// to share the handle across contexts must serialize access themselves.
#[derive(Debug)]
pub struct OpenLog<I2C> {
    i2c: I2C,
    address: u8,
    escape_character: u8,
    escape_character_count: u8,
    listing: ListingState,
}

impl<I2C, E> OpenLog<I2C>
where
    I2C: Write<Error = E> + Read<Error = E>,
{
    /// Creates a new logger driver and checks that its SD card is usable.
    ///
    /// # Parameters
    ///
    /// * **`i2c`**: An I2C master with the logger attached. Must already be
    ///   initialized at the speed of the caller's choice.
    /// * **`address`**: The logger's 7-bit address, [`DEFAULT_ADDRESS`]
    ///   unless reconfigured.
    ///
    /// Queries the status byte once and fails with
    /// [`Error::SdCardNotReady`] if the logger reports that the card did
    /// not initialize (card missing or unreadable).
    pub fn init(i2c: I2C, address: u8) -> Result<Self, Error<E>> {
        let mut this = Self {
            i2c,
            address,
            escape_character: DEFAULT_ESCAPE_CHARACTER,
            escape_character_count: 0,
            listing: ListingState::Idle,
        };
        let status = this.status()?;
        info!("OpenLog::init: status = {:?}", status);

        if !status.contains(Status::SD_INIT_GOOD) {
            return Err(Error::SdCardNotReady);
        }

        Ok(this)
    }

    /// The device address currently in use.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Sets the escape character transmitted ahead of command keywords.
    pub fn set_escape_character(&mut self, character: u8) {
        self.escape_character = character;
    }

    /// Sets how many escape characters are transmitted ahead of each
    /// command keyword. Defaults to zero.
    pub fn set_escape_character_count(&mut self, count: u8) {
        self.escape_character_count = count;
    }

    /// Releases the bus handle so it can be used elsewhere.
    pub fn free(self) -> I2C {
        self.i2c
    }

    /// Reads the logger's status byte.
    pub fn status(&mut self) -> Result<Status, Error<E>> {
        self.send_command(format_args!("stat"))?;

        let mut buf = [0];
        self.i2c.read(self.address, &mut buf).map_err(Error::I2c)?;
        Ok(Status::from_bits_truncate(buf[0]))
    }

    /// Reads the logger's firmware version.
    pub fn firmware_version(&mut self) -> Result<FirmwareVersion, Error<E>> {
        self.send_command(format_args!("ver"))?;

        let mut buf = [0; 2];
        self.i2c.read(self.address, &mut buf).map_err(Error::I2c)?;
        Ok(FirmwareVersion {
            major: buf[0],
            minor: buf[1],
        })
    }

    /// Moves the logger to a new I2C address.
    ///
    /// The logger stores the change in its EEPROM and config file, so it
    /// persists across power cycles. On success the driver switches its own
    /// traffic to the new address as well.
    pub fn set_address(&mut self, address: u8) -> Result<(), Error<E>> {
        self.send_command(format_args!("adr {}", address))?;
        self.address = address;
        Ok(())
    }

    /// Opens `file_name` for appending, creating it if it does not exist.
    ///
    /// Everything subsequently sent through the write path is recorded to
    /// this file.
    pub fn append(&mut self, file_name: &str) -> Result<(), Error<E>> {
        self.send_command(format_args!("append {}", file_name))
    }

    /// Creates `file_name` in the working directory without opening it.
    ///
    /// The logger keeps recording to whatever file was opened last; use
    /// [`OpenLog::append`] to switch.
    pub fn create(&mut self, file_name: &str) -> Result<(), Error<E>> {
        self.send_command(format_args!("new {}", file_name))
    }

    /// Creates a directory inside the working directory.
    pub fn make_directory(&mut self, directory_name: &str) -> Result<(), Error<E>> {
        self.send_command(format_args!("md {}", directory_name))
    }

    /// Changes the logger's working directory.
    pub fn change_directory(&mut self, directory_name: &str) -> Result<(), Error<E>> {
        self.send_command(format_args!("cd {}", directory_name))
    }

    /// Queries the size of a file in bytes.
    ///
    /// The logger reports a negative value for files it cannot find.
    pub fn size(&mut self, file_name: &str) -> Result<i32, Error<E>> {
        self.send_command(format_args!("size {}", file_name))?;
        self.read_i32()
    }

    /// Removes a file. Wildcards are supported; returns the number of items
    /// removed.
    pub fn remove_file(&mut self, file_name: &str) -> Result<i32, Error<E>> {
        self.remove(file_name, false)
    }

    /// Removes a directory together with its contents.
    ///
    /// The logger reports 1 for a removed directory even when it also
    /// deleted files inside it.
    pub fn remove_directory(&mut self, directory_name: &str) -> Result<i32, Error<E>> {
        self.remove(directory_name, true)
    }

    /// Removes a file or directory, returning the logger's count of removed
    /// items. With `recursive`, directories are deleted along with
    /// everything inside them.
    pub fn remove(&mut self, target: &str, recursive: bool) -> Result<i32, Error<E>> {
        if recursive {
            self.send_command(format_args!("rm -rf {}", target))?;
        } else {
            self.send_command(format_args!("rm {}", target))?;
        }
        self.read_i32()
    }

    /// Reads a file's contents into `buf`, starting at the beginning of the
    /// file. See [`OpenLog::read_at`].
    pub fn read(&mut self, file_name: &str, buf: &mut [u8]) -> Result<(), Error<E>> {
        self.read_at(file_name, 0, buf)
    }

    /// Reads a file's contents into `buf`, starting `offset` bytes into the
    /// file.
    ///
    /// Exactly `buf.len()` bytes are requested from the logger, in chunks
    /// of at most [`I2C_BUFFER_LENGTH`]. Once the end of the file is
    /// reached the logger pads the remainder with zero bytes; callers that
    /// need the real length must bound `buf` using [`OpenLog::size`].
    pub fn read_at(&mut self, file_name: &str, offset: u16, buf: &mut [u8]) -> Result<(), Error<E>> {
        self.send_command(format_args!("read {} {}", file_name, offset))?;

        for chunk in buf.chunks_mut(I2C_BUFFER_LENGTH) {
            self.i2c.read(self.address, chunk).map_err(Error::I2c)?;
        }
        Ok(())
    }

    /// Starts enumerating the working directory. Wildcard patterns such as
    /// `*` or `*.txt` are supported.
    ///
    /// On success the first entry is ready to be fetched with
    /// [`OpenLog::next_directory_item`]. On a bus failure no enumeration is
    /// started.
    pub fn search_directory(&mut self, pattern: &str) -> Result<(), Error<E>> {
        self.listing = ListingState::Idle;
        self.send_command(format_args!("ls {}", pattern))?;
        self.listing = ListingState::Listing;
        Ok(())
    }

    /// Fetches the next entry of a running directory enumeration.
    ///
    /// Returns `None` once the listing is exhausted, and also when no
    /// enumeration is running at all; in the latter case the bus is not
    /// touched.
    pub fn next_directory_item(
        &mut self,
    ) -> Result<Option<heapless::String<I2C_BUFFER_LENGTH>>, Error<E>> {
        if self.listing == ListingState::Idle {
            return Ok(None);
        }

        let mut chunk = [0; I2C_BUFFER_LENGTH];
        self.i2c.read(self.address, &mut chunk).map_err(Error::I2c)?;
        trace!(
            "OpenLog::next_directory_item: {:?}",
            AsciiSlice(&chunk[..])
        );

        let mut name = heapless::String::new();
        for (i, &byte) in chunk.iter().enumerate() {
            match byte {
                // NUL ends the entry name; further entries may follow.
                0 => return Ok(Some(name)),
                // 0xFF at the start of a chunk ends the whole listing.
                0xFF if i == 0 => {
                    self.listing = ListingState::Idle;
                    return Ok(None);
                }
                _ => {
                    // 8.3 names are plain ASCII, so a full chunk of name
                    // bytes fits the string exactly.
                    name.push(byte as char).ok();
                }
            }
        }

        // No terminator in this chunk; hand back what arrived.
        Ok(Some(name))
    }

    /// Writes a single byte to the currently open file.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error<E>> {
        self.i2c.write(self.address, &[byte]).map_err(Error::I2c)
    }

    /// Writes `data` to the currently open file.
    ///
    /// The buffer is split into transactions of at most
    /// [`I2C_BUFFER_LENGTH`] bytes. The first transaction that fails aborts
    /// the transfer, leaving the remaining bytes unsent.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Error<E>> {
        for chunk in data.chunks(I2C_BUFFER_LENGTH) {
            self.i2c.write(self.address, chunk).map_err(Error::I2c)?;
        }
        Ok(())
    }

    /// Builds one command line and sends it as a single transaction.
    fn send_command(&mut self, command: fmt::Arguments<'_>) -> Result<(), Error<E>> {
        let mut line = CommandLine::new();
        for _ in 0..self.escape_character_count {
            line.push(self.escape_character)
                .map_err(|_| Error::CommandTooLong)?;
        }
        fmt::Write::write_fmt(&mut line, command).map_err(|_| Error::CommandTooLong)?;

        trace!("OpenLog::send_command: {:?}", AsciiSlice(line.as_bytes()));
        self.i2c
            .write(self.address, line.as_bytes())
            .map_err(Error::I2c)
    }

    fn read_i32(&mut self) -> Result<i32, Error<E>> {
        let mut buf = [0; 4];
        self.i2c.read(self.address, &mut buf).map_err(Error::I2c)?;
        Ok(i32::from_be_bytes(buf))
    }
}

impl<I2C, E> fmt::Write for OpenLog<I2C>
where
    I2C: Write<Error = E> + Read<Error = E>,
{
    /// Streams text to the currently open file through the chunked write
    /// path. Formatted output may be delivered in several transactions; a
    /// bus failure surfaces as [`fmt::Error`].
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Transaction-level bus double: records every write and serves
    /// scripted read payloads, zero-filling short ones like the logger does
    /// at end of file.
    #[derive(Debug, Default)]
    struct MockBus {
        writes: Vec<(u8, Vec<u8>)>,
        reads: VecDeque<Vec<u8>>,
        read_sizes: Vec<usize>,
        nack_write_at: Option<usize>,
    }

    #[derive(Debug, PartialEq)]
    struct Nack;

    impl Write for MockBus {
        type Error = Nack;

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Nack> {
            if self.nack_write_at == Some(self.writes.len()) {
                return Err(Nack);
            }
            self.writes.push((address, bytes.to_vec()));
            Ok(())
        }
    }

    impl Read for MockBus {
        type Error = Nack;

        fn read(&mut self, _address: u8, buffer: &mut [u8]) -> Result<(), Nack> {
            self.read_sizes.push(buffer.len());
            let payload = self.reads.pop_front().unwrap_or_default();
            for (slot, byte) in buffer
                .iter_mut()
                .zip(payload.iter().chain(core::iter::repeat(&0)))
            {
                *slot = *byte;
            }
            Ok(())
        }
    }

    /// A logger whose SD card reported ready during `init`.
    fn ready_logger() -> OpenLog<MockBus> {
        let mut bus = MockBus::default();
        bus.reads.push_back(vec![0x01]);
        OpenLog::init(bus, DEFAULT_ADDRESS).unwrap()
    }

    fn sent(log: &OpenLog<MockBus>, index: usize) -> &[u8] {
        &log.i2c.writes[index].1
    }

    #[test]
    fn init_checks_the_sd_status_bit() {
        let log = ready_logger();
        assert_eq!(sent(&log, 0), b"stat");

        let mut bus = MockBus::default();
        bus.reads.push_back(vec![0x1E]); // everything but SD_INIT_GOOD
        match OpenLog::init(bus, DEFAULT_ADDRESS) {
            Err(Error::SdCardNotReady) => (),
            other => panic!("expected SdCardNotReady, got {:?}", other),
        }
    }

    #[test]
    fn status_reads_one_fresh_byte_per_query() {
        let mut log = ready_logger();
        log.i2c.reads.push_back(vec![0b0001_1011]);
        let status = log.status().unwrap();
        assert!(status.contains(Status::SD_INIT_GOOD | Status::FILE_OPEN));
        assert!(!status.contains(Status::LAST_COMMAND_KNOWN));

        // Reserved bits are dropped rather than kept around.
        log.i2c.reads.push_back(vec![0xFF]);
        assert_eq!(log.status().unwrap().bits(), 0x1F);
    }

    #[test]
    fn version_formats_as_major_dot_minor() {
        let mut log = ready_logger();
        log.i2c.reads.push_back(vec![1, 4]);
        let version = log.firmware_version().unwrap();
        assert_eq!(sent(&log, 1), b"ver");
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 4);
        assert_eq!(format!("{}", version), "1.4");
    }

    #[test]
    fn mutation_commands_use_the_documented_keywords() {
        let mut log = ready_logger();
        log.append("log1.txt").unwrap();
        log.create("log2.txt").unwrap();
        log.make_directory("data").unwrap();
        log.change_directory("data").unwrap();

        assert_eq!(sent(&log, 1), b"append log1.txt");
        assert_eq!(sent(&log, 2), b"new log2.txt");
        assert_eq!(sent(&log, 3), b"md data");
        assert_eq!(sent(&log, 4), b"cd data");
    }

    #[test]
    fn remove_switches_between_plain_and_recursive_forms() {
        let mut log = ready_logger();
        log.i2c.reads.push_back(vec![0, 0, 0, 2]);
        assert_eq!(log.remove_file("*.txt").unwrap(), 2);
        assert_eq!(sent(&log, 1), b"rm *.txt");

        log.i2c.reads.push_back(vec![0, 0, 0, 1]);
        assert_eq!(log.remove_directory("data").unwrap(), 1);
        assert_eq!(sent(&log, 2), b"rm -rf data");
    }

    #[test]
    fn size_accumulates_big_endian() {
        let mut log = ready_logger();
        log.i2c.reads.push_back(vec![0x00, 0x01, 0x02, 0x03]);
        assert_eq!(log.size("log1.txt").unwrap(), 0x00010203);
        assert_eq!(sent(&log, 1), b"size log1.txt");

        // A missing file comes back as a negative value.
        log.i2c.reads.push_back(vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(log.size("nope.txt").unwrap(), -1);
    }

    #[test]
    fn append_write_size_round_trip() {
        let mut log = ready_logger();
        let data = [b'x'; 70];

        log.append("log1.txt").unwrap();
        log.write(&data).unwrap();

        log.i2c.reads.push_back(vec![0, 0, 0, 70]);
        assert!(log.size("log1.txt").unwrap() >= data.len() as i32);
    }

    #[test]
    fn writes_are_split_at_the_transaction_limit() {
        let mut log = ready_logger();
        let data: Vec<u8> = (0..70).collect();
        log.write(&data).unwrap();

        let sizes: Vec<usize> = log.i2c.writes[1..].iter().map(|(_, w)| w.len()).collect();
        assert_eq!(sizes, [32, 32, 6]);
        assert_eq!(sent(&log, 1), &data[..32]);
        assert_eq!(sent(&log, 3), &data[64..]);
    }

    #[test]
    fn a_failed_chunk_aborts_the_write() {
        let mut log = ready_logger();
        log.i2c.nack_write_at = Some(2); // second data chunk

        match log.write(&[0u8; 70]) {
            Err(Error::I2c(Nack)) => (),
            other => panic!("expected a bus error, got {:?}", other),
        }
        // Only the first chunk made it out; nothing was sent after the
        // failure.
        assert_eq!(log.i2c.writes.len(), 2);
    }

    #[test]
    fn write_byte_is_a_single_transaction() {
        let mut log = ready_logger();
        log.write_byte(b'!').unwrap();
        assert_eq!(sent(&log, 1), b"!");
    }

    #[test]
    fn listing_yields_names_in_order_then_goes_idle() {
        let mut log = ready_logger();
        log.search_directory("*").unwrap();
        assert_eq!(sent(&log, 1), b"ls *");

        log.i2c.reads.push_back(b"log1.txt\0".to_vec());
        log.i2c.reads.push_back(b"log2.txt\0".to_vec());
        log.i2c.reads.push_back(vec![0xFF; I2C_BUFFER_LENGTH]);

        assert_eq!(log.next_directory_item().unwrap().unwrap().as_str(), "log1.txt");
        assert_eq!(log.next_directory_item().unwrap().unwrap().as_str(), "log2.txt");
        assert_eq!(log.next_directory_item().unwrap(), None);

        // Idle again: further calls stay off the bus.
        let reads_so_far = log.i2c.read_sizes.len();
        assert_eq!(log.next_directory_item().unwrap(), None);
        assert_eq!(log.i2c.read_sizes.len(), reads_so_far);
    }

    #[test]
    fn next_item_without_a_search_stays_off_the_bus() {
        let mut log = ready_logger();
        let reads_so_far = log.i2c.read_sizes.len();
        assert_eq!(log.next_directory_item().unwrap(), None);
        assert_eq!(log.i2c.read_sizes.len(), reads_so_far);
    }

    #[test]
    fn escape_characters_prefix_every_command() {
        let mut log = ready_logger();
        log.set_escape_character_count(2);
        log.append("log1.txt").unwrap();
        assert_eq!(sent(&log, 1), b"\x1a\x1aappend log1.txt");

        log.set_escape_character(b'$');
        log.append("log1.txt").unwrap();
        assert_eq!(sent(&log, 2), b"$$append log1.txt");
    }

    #[test]
    fn oversized_commands_are_rejected_before_touching_the_bus() {
        let mut log = ready_logger();
        let long_name = "a-name-well-beyond-the-transfer-limit.txt";
        match log.append(long_name) {
            Err(Error::CommandTooLong) => (),
            other => panic!("expected CommandTooLong, got {:?}", other),
        }
        assert_eq!(log.i2c.writes.len(), 1); // just the init status query
    }

    #[test]
    fn set_address_redirects_subsequent_traffic() {
        let mut log = ready_logger();
        log.set_address(0x1A).unwrap();
        assert_eq!(log.i2c.writes[1].0, DEFAULT_ADDRESS);
        assert_eq!(sent(&log, 1), b"adr 26");
        assert_eq!(log.address(), 0x1A);

        log.i2c.reads.push_back(vec![0x01]);
        log.status().unwrap();
        assert_eq!(log.i2c.writes[2].0, 0x1A);
    }

    #[test]
    fn reads_are_chunked_and_zero_filled_past_eof() {
        let mut log = ready_logger();
        log.i2c.reads.push_back(vec![b'a'; 32]);
        log.i2c.reads.push_back(vec![b'b'; 32]);
        log.i2c.reads.push_back(vec![b'c', b'd']); // EOF inside the chunk

        let mut buf = [0xAA; 70];
        log.read_at("log1.txt", 12, &mut buf).unwrap();

        assert_eq!(sent(&log, 1), b"read log1.txt 12");
        assert_eq!(&log.i2c.read_sizes[1..], &[32, 32, 6][..]);
        assert_eq!(&buf[..32], &[b'a'; 32][..]);
        assert_eq!(&buf[64..66], b"cd");
        assert_eq!(&buf[66..], &[0; 4][..]);
    }

    #[test]
    fn formatted_text_goes_through_the_write_path() {
        use core::fmt::Write as _;

        let mut log = ready_logger();
        write!(log, "vbat = {}", 3974).unwrap();

        let text: Vec<u8> = log.i2c.writes[1..]
            .iter()
            .flat_map(|(_, w)| w.iter().copied())
            .collect();
        assert_eq!(text, b"vbat = 3974");
    }
}
