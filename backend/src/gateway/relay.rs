//! Step-wise copy of a worker's response stream into a caller's sink.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest chunk moved by one relay step.
pub const CHUNK_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to read from upstream: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to sink: {0}")]
    Write(#[source] io::Error),

    #[error("Sink accepted zero bytes")]
    WriteZero,
}

/// Relays one upstream byte stream, one chunk per [`StreamRelay::relay_once`] call.
///
/// The relay owns the upstream. Once it reports done it stays done.
pub struct StreamRelay<R> {
    upstream: R,
    buf: Box<[u8]>,
    done: bool,
    relayed: u64,
}

impl<R> StreamRelay<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(upstream: R) -> Self {
        Self {
            upstream,
            buf: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            done: false,
            relayed: 0,
        }
    }

    /// Read at most one chunk and write all of it to `sink`.
    ///
    /// Returns `Ok(true)` once the upstream is exhausted.
    pub async fn relay_once<W>(&mut self, sink: &mut W) -> Result<bool, RelayError>
    where
        W: AsyncWrite + Unpin,
    {
        if self.done {
            return Ok(true);
        }

        let n = self.upstream.read(&mut self.buf).await.map_err(RelayError::Read)?;
        if n == 0 {
            self.done = true;
            return Ok(true);
        }

        write_fully(sink, &self.buf[..n]).await?;
        sink.flush().await.map_err(RelayError::Write)?;
        self.relayed += n as u64;

        Ok(false)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bytes forwarded to the sink so far.
    pub fn relayed_bytes(&self) -> u64 {
        self.relayed
    }
}

async fn write_fully<W>(sink: &mut W, mut chunk: &[u8]) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
{
    while !chunk.is_empty() {
        match sink.write(chunk).await {
            Ok(0) => return Err(RelayError::WriteZero),
            Ok(written) => chunk = &chunk[written..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RelayError::Write(e)),
        }
    }
    Ok(())
}
