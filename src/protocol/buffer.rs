//! Fixed-capacity buffer with independent read and write cursors.
//!
//! One buffer is allocated when the station is built and then reused for
//! every request and its reply. The request is streamed in by the frame
//! receiver, the handler reads it, and the reply is written back over the
//! same storage starting at offset 0. Nothing here allocates after
//! construction.
//!
//! Cursor invariant: `0 <= read_pos <= write_pos <= capacity`.

use std::str::Utf8Error;

use crate::error::{Result, WifiError};

/// Byte appended after a request or reply so it can be read as text.
pub const TERMINATOR: u8 = 0;

/// Fixed-capacity byte buffer.
pub struct FixedCursorBuffer {
    storage: Box<[u8]>,
    write_pos: usize,
    read_pos: usize,
}

impl FixedCursorBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            write_pos: 0,
            read_pos: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    #[inline]
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Bytes that can still be written before the buffer is full.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.write_pos
    }

    /// Bytes between the read and write cursors.
    #[inline]
    pub fn available(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Append one byte at the write cursor.
    ///
    /// # Errors
    ///
    /// Returns [`WifiError::BufferFull`] when the write cursor is at capacity.
    pub fn write(&mut self, byte: u8) -> Result<()> {
        if self.write_pos == self.capacity() {
            return Err(WifiError::BufferFull {
                capacity: self.capacity(),
            });
        }
        self.storage[self.write_pos] = byte;
        self.write_pos += 1;
        Ok(())
    }

    /// Append a slice. Either all of it is written or none of it.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.remaining() {
            return Err(WifiError::BufferFull {
                capacity: self.capacity(),
            });
        }
        self.storage[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
        Ok(())
    }

    /// Discard content: the write cursor (and with it the read cursor)
    /// returns to the start.
    pub fn reset_for_write(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
    }

    /// Move both cursors. Out-of-range values are clamped so the cursor
    /// invariant always holds.
    pub fn reposition(&mut self, write_pos: usize, read_pos: usize) {
        self.write_pos = write_pos.min(self.capacity());
        self.read_pos = read_pos.min(self.write_pos);
    }

    /// The bytes between the read and write cursors.
    pub fn readable(&self) -> &[u8] {
        &self.storage[self.read_pos..self.write_pos]
    }

    /// Terminated bytes starting at the read cursor.
    ///
    /// Scans the backing storage, not just the written region, up to the
    /// first [`TERMINATOR`] or the end of the buffer. After a frame has been
    /// repositioned for a handler the write cursor is back at 0 while the
    /// request still sits in storage, which is exactly what this reads.
    pub fn read_all(&self) -> &[u8] {
        let tail = &self.storage[self.read_pos..];
        let end = tail
            .iter()
            .position(|&b| b == TERMINATOR)
            .unwrap_or(tail.len());
        &tail[..end]
    }

    /// [`read_all`](Self::read_all) interpreted as UTF-8 text.
    pub fn read_all_as_text(&self) -> std::result::Result<&str, Utf8Error> {
        std::str::from_utf8(self.read_all())
    }

    /// Stored bytes `[read_pos, read_pos + len)`, regardless of the write
    /// cursor. Used to hand a repositioned request to its handler.
    pub(crate) fn stored(&self, len: usize) -> &[u8] {
        let end = (self.read_pos + len).min(self.capacity());
        &self.storage[self.read_pos..end]
    }
}

impl std::fmt::Debug for FixedCursorBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedCursorBuffer")
            .field("capacity", &self.capacity())
            .field("write_pos", &self.write_pos)
            .field("read_pos", &self.read_pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_advances_cursor() {
        let mut buffer = FixedCursorBuffer::new(8);
        buffer.write(b'a').unwrap();
        buffer.write(b'b').unwrap();

        assert_eq!(buffer.write_pos(), 2);
        assert_eq!(buffer.available(), 2);
        assert_eq!(buffer.readable(), b"ab");
        assert_eq!(buffer.remaining(), 6);
    }

    #[test]
    fn test_write_rejected_at_capacity() {
        let mut buffer = FixedCursorBuffer::new(2);
        buffer.write(1).unwrap();
        buffer.write(2).unwrap();

        let result = buffer.write(3);
        assert!(matches!(result, Err(WifiError::BufferFull { capacity: 2 })));
        assert_eq!(buffer.write_pos(), 2);
        assert_eq!(buffer.readable(), &[1, 2]);
    }

    #[test]
    fn test_write_all_is_all_or_nothing() {
        let mut buffer = FixedCursorBuffer::new(4);
        buffer.write_all(b"abc").unwrap();

        assert!(buffer.write_all(b"de").is_err());
        assert_eq!(buffer.readable(), b"abc");

        buffer.write_all(b"d").unwrap();
        assert_eq!(buffer.readable(), b"abcd");
    }

    #[test]
    fn test_reset_for_write() {
        let mut buffer = FixedCursorBuffer::new(4);
        buffer.write_all(b"abc").unwrap();
        buffer.reposition(3, 1);

        buffer.reset_for_write();

        assert_eq!(buffer.write_pos(), 0);
        assert_eq!(buffer.read_pos(), 0);
        assert_eq!(buffer.available(), 0);
    }

    #[test]
    fn test_reposition_clamps_to_invariant() {
        let mut buffer = FixedCursorBuffer::new(4);

        buffer.reposition(10, 2);
        assert_eq!(buffer.write_pos(), 4);
        assert_eq!(buffer.read_pos(), 2);

        buffer.reposition(1, 3);
        assert_eq!(buffer.write_pos(), 1);
        assert_eq!(buffer.read_pos(), 1);
    }

    #[test]
    fn test_read_all_as_text_stops_at_terminator() {
        let mut buffer = FixedCursorBuffer::new(16);
        buffer.write_all(b"<s>").unwrap();
        buffer.write(TERMINATOR).unwrap();
        buffer.write_all(b"junk").unwrap();

        buffer.reposition(0, 0);

        assert_eq!(buffer.available(), 0);
        assert_eq!(buffer.read_all_as_text().unwrap(), "<s>");
    }

    #[test]
    fn test_read_all_without_terminator_runs_to_capacity() {
        let mut buffer = FixedCursorBuffer::new(3);
        buffer.write_all(b"xyz").unwrap();
        assert_eq!(buffer.read_all(), b"xyz");
    }

    #[test]
    fn test_read_all_as_text_invalid_utf8() {
        let mut buffer = FixedCursorBuffer::new(4);
        buffer.write_all(&[0xC3, 0x28, TERMINATOR]).unwrap();
        assert!(buffer.read_all_as_text().is_err());
    }

    #[test]
    fn test_reply_overwrites_request_in_place() {
        let mut buffer = FixedCursorBuffer::new(8);
        buffer.write_all(b"<s>").unwrap();
        buffer.write(TERMINATOR).unwrap();
        buffer.reposition(0, 0);

        assert_eq!(buffer.stored(3), b"<s>");

        buffer.write_all(b"<p1>").unwrap();
        assert_eq!(buffer.readable(), b"<p1>");
        assert_eq!(buffer.available(), 4);
    }
}
