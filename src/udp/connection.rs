use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::net::UdpSocket;

/// Send capability for one client, as seen by the room layer
pub trait Connection: Send + Sync {
    /// Transport identity of the client (address:port as observed on the socket).
    fn identity(&self) -> String;

    fn send<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;
}

/// A client address paired with the shared listening socket.
///
/// Only the listener owns the socket; it closes when the listener stops even
/// while rooms still hold members.
#[derive(Debug, Clone)]
pub struct UdpConnection {
    addr: SocketAddr,
    socket: Weak<UdpSocket>,
}

impl UdpConnection {
    pub fn new(addr: SocketAddr, socket: &Arc<UdpSocket>) -> Self {
        Self {
            addr,
            socket: Arc::downgrade(socket),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Connection for UdpConnection {
    fn identity(&self) -> String {
        self.addr.to_string()
    }

    fn send<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        async move {
            let socket = self.socket.upgrade().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotConnected, "listening socket closed")
            })?;
            socket.send_to(payload, self.addr).await?;
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
pub use mock::MockConnection;

#[cfg(test)]
mod mock {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Records every payload written to it; can be switched to fail writes.
    #[derive(Debug, Default)]
    pub struct MockConnection {
        identity: String,
        sent: Mutex<Vec<Vec<u8>>>,
        failing: AtomicBool,
    }

    impl MockConnection {
        pub fn new(identity: &str) -> Self {
            Self {
                identity: identity.to_string(),
                ..Default::default()
            }
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Connection for MockConnection {
        fn identity(&self) -> String {
            self.identity.clone()
        }

        fn send<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
            let result = if self.failing.load(Ordering::SeqCst) {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            } else {
                self.sent.lock().unwrap().push(payload.to_vec());
                Ok(())
            };
            futures::future::ready(result).boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_connection_writes_to_client_addr() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let conn = UdpConnection::new(client.local_addr().unwrap(), &server);

        assert_eq!(conn.identity(), client.local_addr().unwrap().to_string());
        conn.send(b"ping").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, server.local_addr().unwrap());
    }

    #[tokio::test]
    async fn send_fails_once_the_listener_socket_is_gone() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let conn = UdpConnection::new("127.0.0.1:9".parse().unwrap(), &server);

        drop(server);
        let err = conn.send(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
