// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TCP server exposing the bus to remote clients.
//!
//! Each accepted socket gets a [`PeerClient`] attached to the bus. Lines
//! read from the socket are decoded as [`WireMessage`]s and handed to the
//! peer; notifications flow back through an unbounded queue drained by a
//! dedicated writer task. A peer that closes its socket is detached.
//!
//! # Example
//!
//! ```no_run
//! use astrobus::bus::{Bus, BusConfig};
//! use astrobus::server::{Server, ServerConfig};
//!
//! # async fn example() -> astrobus::Result<()> {
//! let bus = Bus::new(BusConfig::default())?;
//! let server = Server::bind(bus.clone(), &ServerConfig::default()).await?;
//! server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! bus.shutdown();
//! # Ok(())
//! # }
//! ```

mod peer;
mod wire;

pub use peer::PeerClient;
pub use wire::{BlobMode, WireMessage};

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::Result;
use crate::bus::Bus;
use crate::client::ClientId;
use crate::error::ProtocolError;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7624;

/// Network server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
        }
    }
}

impl ServerConfig {
    /// Sets the listening address.
    #[must_use]
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }
}

/// A bound listener serving one bus.
#[derive(Debug)]
pub struct Server {
    bus: Bus,
    listener: TcpListener,
}

impl Server {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the address cannot be bound.
    pub async fn bind(bus: Bus, config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(ProtocolError::from)?;
        tracing::info!(addr = %config.bind_addr, "Server listening");
        Ok(Self { bus, listener })
    }

    /// Address actually bound, useful with port 0.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(ProtocolError::from)?)
    }

    /// Accepts peers until `shutdown` completes, then drops every
    /// connection.
    ///
    /// # Errors
    ///
    /// Accept failures are logged and do not end the loop; this only
    /// returns `Ok`.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut peers = JoinSet::new();

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!(%addr, "Accepted connection");
                        peers.spawn(serve_peer(self.bus.clone(), stream, addr));
                    }
                    Err(error) => tracing::warn!(%error, "Accept failed"),
                },
                Some(_) = peers.join_next(), if !peers.is_empty() => {}
            }
        }

        tracing::info!(peers = peers.len(), "Server stopping");
        peers.shutdown().await;
        Ok(())
    }
}

/// Detaches the peer when its task ends or is aborted.
struct Attached {
    bus: Bus,
    id: ClientId,
}

impl Drop for Attached {
    fn drop(&mut self) {
        if let Err(error) = self.bus.detach_client(self.id) {
            tracing::debug!(client = %self.id, %error, "Peer already detached");
        }
    }
}

async fn serve_peer(bus: Bus, stream: TcpStream, addr: SocketAddr) {
    let (reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WireMessage>();
    let peer = Arc::new(PeerClient::new(addr.to_string(), tx));

    let id = match bus.attach_client(peer.clone()) {
        Ok(id) => id,
        Err(error) => {
            tracing::warn!(%addr, %error, "Refusing peer");
            return;
        }
    };
    let _attached = Attached {
        bus: bus.clone(),
        id,
    };

    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let line = match message.encode() {
                Ok(line) => line,
                Err(error) => {
                    tracing::warn!(%error, "Dropping unencodable message");
                    continue;
                }
            };
            if let Err(error) = writer.write_all(line.as_bytes()).await {
                tracing::debug!(%error, "Peer write failed");
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match WireMessage::decode(&line) {
                Ok(message) => peer.handle(&bus, message),
                Err(error) => tracing::warn!(%addr, %error, "Ignoring malformed line"),
            },
            Ok(None) => {
                tracing::debug!(%addr, "{}", ProtocolError::ConnectionClosed);
                break;
            }
            Err(error) => {
                tracing::debug!(%addr, %error, "Peer read failed");
                break;
            }
        }
    }

    writer_task.abort();
}
