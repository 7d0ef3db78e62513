//! Diagnostic rendering of modem traffic.
//!
//! Everything the transport sends or receives is logged through `tracing` in
//! an escaped form so that control characters in AT traffic stay visible on a
//! single log line.

use std::fmt;

/// Displays a byte slice with control and non-ASCII bytes escaped.
///
/// `\r`, `\n`, `\t` and NUL use their usual escapes, other unprintable bytes
/// become `\xNN`. Formatting does not allocate.
#[derive(Clone, Copy)]
pub struct Escaped<'a>(pub &'a [u8]);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in self.0 {
            match byte {
                b'\r' => f.write_str("\\r")?,
                b'\n' => f.write_str("\\n")?,
                b'\t' => f.write_str("\\t")?,
                0 => f.write_str("\\0")?,
                b'\\' => f.write_str("\\\\")?,
                0x20..=0x7e => fmt::Write::write_char(f, byte as char)?,
                _ => write!(f, "\\x{:02X}", byte)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_passthrough() {
        assert_eq!(Escaped(b"<s>").to_string(), "<s>");
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(Escaped(b"\r\nOK\r\n").to_string(), "\\r\\nOK\\r\\n");
        assert_eq!(Escaped(b"a\0b\tc").to_string(), "a\\0b\\tc");
    }

    #[test]
    fn test_binary_bytes() {
        assert_eq!(Escaped(&[0x01, 0xFF]).to_string(), "\\x01\\xFF");
        assert_eq!(Escaped(b"\\").to_string(), "\\\\");
    }

    #[test]
    fn test_debug_quotes() {
        assert_eq!(format!("{:?}", Escaped(b">")), "\">\"");
    }
}
