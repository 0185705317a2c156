use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes a connection's queued output to a stream, tracking partial writes.
pub struct OutputWriter {
    buffer: BytesMut,
}

impl OutputWriter {
    pub fn new(buffer: BytesMut) -> Self {
        Self { buffer }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while !self.buffer.is_empty() {
            let n = stream.write(&self.buffer).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.buffer.advance(n);
        }

        stream.flush().await?;
        Ok(())
    }
}
