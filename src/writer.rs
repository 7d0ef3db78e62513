//! Dedicated writer task for the serial link.
//!
//! The station runs on a blocking worker and must not wait on the serial
//! port, so outbound bytes are handed to a tokio task over an mpsc channel.
//! The task drains whatever has queued up and writes it with a single
//! vectored write where the port allows.
//!
//! # Architecture
//!
//! ```text
//! Station (blocking) ─► mpsc::Sender<Bytes> ─► Writer Task ─► Serial port
//! ```

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, WifiError};

/// Default channel capacity, in queued chunks.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Maximum chunks to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for queueing bytes on the writer task.
///
/// This is cheaply cloneable.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue a chunk, waiting for channel space.
    #[cfg(test)]
    pub(crate) async fn send(&self, chunk: Bytes) -> Result<()> {
        self.tx.send(chunk).await.map_err(|_| WifiError::LinkClosed)
    }

    /// Queue a chunk from synchronous code.
    ///
    /// Blocks the calling thread while the channel is full. Must not be
    /// called from inside an async task.
    pub fn blocking_send(&self, chunk: Bytes) -> Result<()> {
        self.tx.blocking_send(chunk).map_err(|_| WifiError::LinkClosed)
    }

    /// `true` once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing bytes.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)`. The task ends cleanly when every
/// handle has been dropped.
pub fn spawn_writer_task<W>(writer: W, channel_capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives chunks and writes them to the port.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(chunk) => chunk,
            None => return Ok(()),
        };

        // Collect additional ready chunks (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(chunk) => batch.push(chunk),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!("Serial write failed: {}", e);
            return Err(e);
        }
    }
}

/// Write a batch of chunks using vectored I/O, continuing after partial
/// writes.
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(Bytes::len).sum();
    if total_size == 0 {
        return Ok(());
    }

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(WifiError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data left after `skip_bytes` were written.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for chunk in batch {
        let end = offset + chunk.len();
        if skip_bytes < end && !chunk.is_empty() {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&chunk[start..]));
        }
        offset = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        handle.send(Bytes::from_static(b"AT\r\n")).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"AT\r\n");
    }

    #[tokio::test]
    async fn test_writer_batching_preserves_order() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        for i in 0..10u8 {
            handle.send(Bytes::copy_from_slice(&[b'0' + i])).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = vec![0u8; 64];
        let mut received = Vec::new();
        while received.len() < 10 {
            let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf)
                .await
                .unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"0123456789");
    }

    #[test]
    fn test_blocking_send_from_thread() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (client, mut server) = duplex(4096);
        let (handle, _task) = {
            let _guard = runtime.enter();
            spawn_writer_task(client, 4)
        };

        std::thread::spawn(move || handle.blocking_send(Bytes::from_static(b"hi")))
            .join()
            .unwrap()
            .unwrap();

        let received = runtime.block_on(async {
            let mut buf = [0u8; 2];
            tokio::io::AsyncReadExt::read_exact(&mut server, &mut buf)
                .await
                .unwrap();
            buf
        });
        assert_eq!(&received, b"hi");
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![Bytes::from_static(b"AT"), Bytes::from_static(b"\r\n")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_build_remaining_slices_partial_chunk() {
        let batch = vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world")];
        let slices = build_remaining_slices(&batch, 3);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], b"lo");
        assert_eq!(&*slices[1], b"world");
    }

    #[test]
    fn test_build_remaining_slices_skips_whole_chunk() {
        let batch = vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world")];
        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], b"world");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(|_| Bytes::from_static(b"abc")).collect();

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner(), b"abcabcabcabcabc");
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_send_after_writer_stopped() {
        let (tx, rx) = mpsc::channel::<Bytes>(1);
        drop(rx);
        let handle = WriterHandle { tx };

        assert!(handle.is_closed());
        let result = handle.send(Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(WifiError::LinkClosed)));
    }
}
