use core::fmt;

/// Formats a byte slice as the mostly-ASCII protocol text it carries.
///
/// Printable characters are shown as-is, everything else as `\x` escapes,
/// which keeps logged command lines and directory chunks readable.
pub struct AsciiSlice<T>(pub T)
where
    T: AsRef<[u8]>;

impl<T: AsRef<[u8]>> fmt::Debug for AsciiSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for &byte in self.0.as_ref() {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{:02x}", byte)?;
            }
        }
        f.write_str("\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_non_printable_bytes() {
        let rendered = format!("{:?}", AsciiSlice(b"ls *.txt"));
        assert_eq!(rendered, "\"ls *.txt\"");

        let rendered = format!("{:?}", AsciiSlice([0x1A, b'v', b'e', b'r', 0xFF]));
        assert_eq!(rendered, "\"\\x1aver\\xff\"");
    }
}
