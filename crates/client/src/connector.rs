//! Connection establishment
//!
//! A [`Connector`] produces the byte stream a session talks over. Production
//! code uses [`TcpConnector`]; tests plug in
//! [`LoopbackConnector`](crate::loopback::LoopbackConnector) to run against an
//! in-process simulator.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Bidirectional byte stream owned by a session
pub trait SimulatorStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> SimulatorStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxedStream = Box<dyn SimulatorStream>;

/// Opens the stream to a simulator
///
/// # Example: Implementing a custom connector
///
/// ```no_run
/// use async_trait::async_trait;
/// use traclink_client::connector::{BoxedStream, Connector};
///
/// struct UnixConnector;
///
/// #[async_trait]
/// impl Connector for UnixConnector {
///     async fn connect(&self, host: &str, _port: u16) -> std::io::Result<BoxedStream> {
///         let stream = tokio::net::UnixStream::connect(host).await?;
///         Ok(Box::new(stream))
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, host: &str, port: u16) -> std::io::Result<BoxedStream>;
}

/// Plain TCP connection to the simulator
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> std::io::Result<BoxedStream> {
        let stream = TcpStream::connect((host, port)).await?;
        // Requests are small and strictly request/response
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
