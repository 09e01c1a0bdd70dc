use super::MeterAddress;
use futures_util::{future::BoxFuture, FutureExt};
use log::debug;
use std::io;
use tokio::{io::AsyncRead, net::TcpStream};

/// Read half of an established meter connection
pub type MeterStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opens transports for a supervisor. Dropping the returned stream closes it.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, address: &'a MeterAddress) -> BoxFuture<'a, io::Result<MeterStream>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, address: &'a MeterAddress) -> BoxFuture<'a, io::Result<MeterStream>> {
        async move {
            let stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
            let _ = stream.set_nodelay(true);
            debug!("[{address}] TCP connection established");
            Ok(Box::new(stream) as MeterStream)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{io::{AsyncReadExt, AsyncWriteExt}, net::TcpListener};

    #[tokio::test]
    async fn test_tcp_connector_reads_from_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"/ISK5\r\n!").await.unwrap();
        });

        let address = MeterAddress::new("127.0.0.1", port);
        let mut stream = TcpConnector.connect(&address).await.unwrap();

        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"/ISK5\r\n!");
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let address = MeterAddress::new("127.0.0.1", port);
        assert!(TcpConnector.connect(&address).await.is_err());
    }
}
