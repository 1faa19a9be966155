//! Address resolution and listening socket setup.

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use log::info;
use socket2::{Domain, Protocol, Socket, Type};

use crate::server::error::Error;

/// Backlog passed to `listen(2)`, matching tokio's `TcpListener::bind`.
const DEFAULT_BACKLOG: i32 = 1024;

/// Resolve an address/port pair to the first endpoint it yields.
pub fn resolve(address: &str, port: &str) -> Result<SocketAddr, Error> {
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| Error::InvalidPort(port.to_string()))?;

    let mut endpoints = (address, port).to_socket_addrs().map_err(|source| Error::Resolve {
        address: address.to_string(),
        port,
        source,
    })?;

    endpoints.next().ok_or_else(|| Error::NoAddress {
        address: address.to_string(),
        port,
    })
}

/// A bound, listening socket not yet registered with an event loop.
#[derive(Debug)]
pub(crate) struct ListeningSocket {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ListeningSocket {
    /// Open a socket for `addr`'s family, enable address reuse, bind and listen.
    pub(crate) fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let bind_error = |source| Error::Bind { addr, source };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(bind_error)?;
        socket.set_reuse_address(true).map_err(bind_error)?;
        socket.bind(&addr.into()).map_err(bind_error)?;
        socket.listen(DEFAULT_BACKLOG).map_err(bind_error)?;
        // Registration with the reactor requires non-blocking mode.
        socket.set_nonblocking(true).map_err(bind_error)?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr().map_err(bind_error)?;
        info!("Listening on {local_addr}");

        Ok(Self { listener, local_addr })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn into_std(self) -> TcpListener {
        self.listener
    }
}
