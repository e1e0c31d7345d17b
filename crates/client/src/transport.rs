//! Request/response transport over a connected stream
//!
//! Exactly one request is in flight at a time: [`Transport::send`] writes a
//! complete packet and [`Transport::receive`] reads exactly one complete
//! response, however the bytes happen to be split across reads.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use traclink_protocol::frame::{self, LENGTH_PREFIX_LEN};

use crate::connector::BoxedStream;
use crate::error::{ClientError, Result};

pub struct Transport {
    stream: BoxedStream,
    read_timeout: Option<Duration>,
    max_response_len: usize,
}

impl Transport {
    pub fn new(stream: BoxedStream, read_timeout: Option<Duration>, max_response_len: usize) -> Self {
        Self {
            stream,
            read_timeout,
            max_response_len,
        }
    }

    /// Writes the whole packet
    pub async fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.stream
            .write_all(packet)
            .await
            .map_err(ClientError::TransportWrite)?;
        self.stream
            .flush()
            .await
            .map_err(ClientError::TransportWrite)?;

        tracing::trace!(bytes = packet.len(), "Packet written");
        Ok(())
    }

    /// Reads one complete response, length prefix included
    pub async fn receive(&mut self) -> Result<Bytes> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_response())
                .await
                .map_err(|_| ClientError::ReadTimeout(limit))?,
            None => self.read_response().await,
        }
    }

    async fn read_response(&mut self) -> Result<Bytes> {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        self.read_full(&mut prefix).await?;

        let total = frame::decode_length_prefix(prefix)
            .map_err(|e| ClientError::CorruptedStream(e.to_string()))?;
        if total > self.max_response_len {
            return Err(ClientError::CorruptedStream(format!(
                "response length {total} exceeds limit {}",
                self.max_response_len
            )));
        }

        let mut buf = BytesMut::with_capacity(total);
        buf.put_slice(&prefix);
        buf.resize(total, 0);
        self.read_full(&mut buf[LENGTH_PREFIX_LEN..]).await?;

        tracing::trace!(bytes = total, "Response received");
        Ok(buf.freeze())
    }

    /// Fills `buf` completely, looping over short reads
    async fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .stream
                .read(&mut buf[filled..])
                .await
                .map_err(ClientError::TransportRead)?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            filled += n;
            if filled < buf.len() {
                tracing::trace!(filled, expected = buf.len(), "Partial read");
            }
        }
        Ok(())
    }

    /// Shuts down the write half; errors are irrelevant at this point
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "Stream shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn transport(stream: tokio::io::DuplexStream) -> Transport {
        Transport::new(Box::new(stream), Some(Duration::from_secs(2)), 1024)
    }

    #[tokio::test]
    async fn test_send_writes_whole_packet() {
        let (client, mut server) = duplex(64);
        let mut transport = transport(client);

        transport.send(&[0, 0, 0, 6, 2, 0x7F]).await.unwrap();

        let mut received = [0u8; 6];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, [0, 0, 0, 6, 2, 0x7F]);
    }

    #[tokio::test]
    async fn test_send_to_closed_peer() {
        let (client, server) = duplex(64);
        let mut transport = transport(client);
        drop(server);

        let result = transport.send(&[0, 0, 0, 6, 2, 0x7F]).await;
        assert!(matches!(result, Err(ClientError::TransportWrite(_))));
        assert!(result.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_receive_in_three_chunks() {
        let (client, mut server) = duplex(64);
        let mut transport = transport(client);

        let response: Vec<u8> = vec![0, 0, 0, 11, 7, 0x02, 0x00, 0, 0, 0, 0];
        let chunks = [response[..3].to_vec(), response[3..7].to_vec(), response[7..].to_vec()];

        let writer = tokio::spawn(async move {
            for chunk in chunks {
                server.write_all(&chunk).await.unwrap();
                server.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            server
        });

        let received = transport.receive().await.unwrap();
        assert_eq!(&received[..], &response[..]);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_rejects_invalid_prefix() {
        let (client, mut server) = duplex(64);
        let mut transport = transport(client);

        server.write_all(&[0, 0, 0, 2]).await.unwrap();
        assert!(matches!(
            transport.receive().await,
            Err(ClientError::CorruptedStream(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_rejects_oversized_response() {
        let (client, mut server) = duplex(64);
        let mut transport = transport(client);

        server.write_all(&[0, 0, 0x10, 0]).await.unwrap();
        assert!(matches!(
            transport.receive().await,
            Err(ClientError::CorruptedStream(_))
        ));
    }

    #[tokio::test]
    async fn test_peer_closed_mid_response() {
        let (client, mut server) = duplex(64);
        let mut transport = transport(client);

        server.write_all(&[0, 0, 0, 11, 7]).await.unwrap();
        drop(server);

        let result = transport.receive().await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        assert!(result.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (client, _server) = duplex(64);
        let mut transport = Transport::new(Box::new(client), Some(Duration::from_millis(20)), 1024);

        assert!(matches!(
            transport.receive().await,
            Err(ClientError::ReadTimeout(_))
        ));
    }
}
