pub mod connection;
pub mod dispatch;
pub mod listener;
pub mod worker;

pub use connection::{Connection, UdpConnection};
pub use dispatch::{Dispatcher, Inbound};
pub use listener::UdpListener;

#[cfg(test)]
pub use connection::MockConnection;
