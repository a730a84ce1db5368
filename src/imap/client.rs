// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_imap::extensions::idle::IdleResponse;
use async_imap::types::UnsolicitedResponse;
use async_imap::{Client as AsyncImapClient, Session as AsyncImapSession};
use async_trait::async_trait;
use log::{debug, warn};
use rustls_pki_types::ServerName as PkiServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream as TokioTcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_rustls::{client::TlsStream as TokioTlsStreamClient, TlsConnector};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::imap::error::ImapError;
use crate::imap::session::{Connection, Dialer};
use crate::imap::types::{IdleExit, IdleOptions, StopSignal, Update};

// --- Type Aliases ---

type BaseTcpStream = TokioTcpStream;
type BaseTlsStream = TokioTlsStreamClient<BaseTcpStream>;

type UnderlyingImapClient<S> = AsyncImapClient<Compat<S>>;
type UnderlyingImapSession<S> = AsyncImapSession<Compat<S>>;

/// Byte streams an IMAP link can run over.
pub trait LinkStream: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send + Sync + 'static {}

impl<S> LinkStream for S where S: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send + Sync + 'static {}

/// The production link: IMAP over TLS over TCP.
pub type TlsConnection = ImapConnection<BaseTlsStream>;

/// Port used when the server address does not name one.
pub const DEFAULT_IMAPS_PORT: u16 = 993;

/// Upper bound for dial, login, select and logout round-trips.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Splits `host:port`, defaulting the port to 993. IPv6 literals must be
/// bracketed (`[::1]:993`).
pub fn parse_server_address(server: &str) -> Result<(String, u16), ImapError> {
    let invalid = || ImapError::InvalidAddress(server.to_string());

    let (host, port) = if let Some(rest) = server.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        match tail {
            "" => (host, None),
            _ => (host, Some(tail.strip_prefix(':').ok_or_else(invalid)?)),
        }
    } else {
        match server.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => (host, Some(port)),
            Some(_) => return Err(invalid()),
            None => (server, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = match port {
        Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
        None => DEFAULT_IMAPS_PORT,
    };
    Ok((host.to_string(), port))
}

// --- Internal Connection Logic ---

fn build_tls_connector() -> Result<TlsConnector, ImapError> {
    let mut root_cert_store = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs()?;
    let (added, ignored) = root_cert_store.add_parsable_certificates(certs);
    debug!("Loaded {} native certs, ignored {}.", added, ignored);
    if root_cert_store.is_empty() {
        warn!("Root certificate store is empty after loading native certs.");
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Establishes TCP connection and performs the TLS handshake.
async fn setup_tls_stream(
    host: &str,
    port: u16,
    tls_connector: TlsConnector,
    server_name_for_tls: PkiServerName<'static>,
) -> Result<BaseTlsStream, ImapError> {
    debug!("Attempting TCP connection to {}:{}...", host, port);
    let tcp_stream = BaseTcpStream::connect((host, port)).await?;
    debug!("TCP connected. Performing TLS handshake...");

    let tls_stream = tls_connector
        .connect(server_name_for_tls, tcp_stream)
        .await
        .map_err(|e| ImapError::Tls(e.to_string()))?;
    debug!("TLS handshake successful.");
    Ok(tls_stream)
}

/// Dials IMAP servers over TLS using the platform trust store.
#[derive(Debug, Clone)]
pub struct TlsDialer {
    connect_timeout: Duration,
}

impl TlsDialer {
    pub fn new() -> Self {
        Self {
            connect_timeout: COMMAND_TIMEOUT,
        }
    }
}

impl Default for TlsDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dialer for TlsDialer {
    type Connection = TlsConnection;

    async fn dial(&self, server: &str) -> Result<TlsConnection, ImapError> {
        let (host, port) = parse_server_address(server)?;
        let server_name: PkiServerName<'static> = PkiServerName::try_from(host.clone())
            .map_err(|_| ImapError::InvalidAddress(server.to_string()))?;
        let tls_connector = build_tls_connector()?;

        let tls_stream = timeout(
            self.connect_timeout,
            setup_tls_stream(&host, port, tls_connector, server_name),
        )
        .await
        .map_err(|_| ImapError::Timeout(format!("connecting to {}", server)))??;

        Ok(ImapConnection::new(tls_stream))
    }
}

enum LinkState<S: LinkStream> {
    Connected(UnderlyingImapClient<S>),
    Authenticated(UnderlyingImapSession<S>),
    Closed,
}

/// An IMAP link driven by `async-imap` over any [`LinkStream`].
pub struct ImapConnection<S: LinkStream> {
    state: LinkState<S>,
}

impl<S: LinkStream> ImapConnection<S> {
    /// Wraps a freshly connected stream. The server greeting is consumed by
    /// the first command.
    pub fn new(stream: S) -> Self {
        Self {
            state: LinkState::Connected(AsyncImapClient::new(stream.compat())),
        }
    }

    fn take_session(&mut self, required: &'static str) -> Result<UnderlyingImapSession<S>, ImapError> {
        match std::mem::replace(&mut self.state, LinkState::Closed) {
            LinkState::Authenticated(session) => Ok(session),
            other => {
                self.state = other;
                Err(ImapError::InvalidState(required))
            }
        }
    }
}

#[async_trait]
impl<S: LinkStream> Connection for ImapConnection<S> {
    async fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError> {
        let client = match std::mem::replace(&mut self.state, LinkState::Closed) {
            LinkState::Connected(client) => client,
            other => {
                self.state = other;
                return Err(ImapError::InvalidState("an unauthenticated connection"));
            }
        };

        match timeout(COMMAND_TIMEOUT, client.login(username, password)).await {
            Ok(Ok(session)) => {
                self.state = LinkState::Authenticated(session);
                Ok(())
            }
            Ok(Err((e, _client))) => Err(ImapError::Auth(ImapError::from(e).to_string())),
            Err(_) => Err(ImapError::Timeout("login".to_string())),
        }
    }

    async fn select(&mut self, mailbox: &str) -> Result<(), ImapError> {
        let mut session = self.take_session("an authenticated connection")?;
        let result = timeout(COMMAND_TIMEOUT, session.examine(mailbox)).await;
        self.state = LinkState::Authenticated(session);

        match result {
            Ok(Ok(mailbox_info)) => {
                debug!("Mailbox {} has {} messages", mailbox, mailbox_info.exists);
                Ok(())
            }
            Ok(Err(async_imap::error::Error::No(msg))) => {
                Err(ImapError::InvalidMailbox(format!("{}: {}", mailbox, msg)))
            }
            Ok(Err(e)) => Err(ImapError::from(e)),
            Err(_) => Err(ImapError::Timeout(format!("selecting {}", mailbox))),
        }
    }

    async fn idle(
        &mut self,
        stop: &StopSignal,
        options: &IdleOptions,
        updates: &mpsc::Sender<Update>,
    ) -> Result<IdleExit, ImapError> {
        let mut session = self.take_session("a selected mailbox")?;
        let deadline = Instant::now() + options.logout_timeout;

        let capabilities = session.capabilities().await?;
        if !capabilities.has_str("IDLE") {
            debug!(
                "Server lacks IDLE, polling every {:?}",
                options.poll_interval
            );
            let exit = poll_updates(&mut session, stop, options, deadline, updates).await;
            self.state = LinkState::Authenticated(session);
            return exit;
        }

        // Responses read outside `wait` (while entering or leaving IDLE) are
        // routed to this channel by async-imap.
        let unsolicited = session.unsolicited_responses.clone();
        let mut handle = session.idle();
        handle.init().await?;

        let exit = loop {
            if !forward_unsolicited(|| unsolicited.try_recv().ok(), updates).await {
                break IdleExit::Stopped;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break IdleExit::Timeout;
            }

            // IDLE stays open across notifications; DONE is sent only once
            // the subscription ends.
            let response = {
                let (idle_wait, _interrupt) = handle.wait_with_timeout(remaining);
                tokio::select! {
                    response = idle_wait => Some(response?),
                    _ = stop.stopped() => None,
                }
            };
            match response {
                Some(IdleResponse::NewData(data)) => {
                    if updates.send(Update::from_response(data.parsed())).await.is_err() {
                        break IdleExit::Stopped;
                    }
                }
                Some(IdleResponse::Timeout) => break IdleExit::Timeout,
                Some(IdleResponse::ManualInterrupt) | None => break IdleExit::Stopped,
            }
        };

        let session = timeout(COMMAND_TIMEOUT, handle.done())
            .await
            .map_err(|_| ImapError::Timeout("ending IDLE".to_string()))??;
        let delivered = forward_unsolicited(|| unsolicited.try_recv().ok(), updates).await;
        self.state = LinkState::Authenticated(session);
        Ok(if delivered { exit } else { IdleExit::Stopped })
    }

    async fn logout(&mut self) -> Result<(), ImapError> {
        match std::mem::replace(&mut self.state, LinkState::Closed) {
            LinkState::Authenticated(mut session) => timeout(COMMAND_TIMEOUT, session.logout())
                .await
                .map_err(|_| ImapError::Timeout("logout".to_string()))?
                .map_err(ImapError::from),
            // Dropping the client closes the socket.
            LinkState::Connected(_) | LinkState::Closed => Ok(()),
        }
    }
}

/// Moves responses async-imap queued on the session into `updates`.
/// Returns `false` once the dispatcher has gone away.
async fn forward_unsolicited<F>(mut next: F, updates: &mpsc::Sender<Update>) -> bool
where
    F: FnMut() -> Option<UnsolicitedResponse>,
{
    while let Some(response) = next() {
        if updates.send(Update::from_unsolicited(&response)).await.is_err() {
            return false;
        }
    }
    true
}

/// NOOP-based fallback for servers without IDLE.
async fn poll_updates<S: LinkStream>(
    session: &mut UnderlyingImapSession<S>,
    stop: &StopSignal,
    options: &IdleOptions,
    deadline: Instant,
    updates: &mpsc::Sender<Update>,
) -> Result<IdleExit, ImapError> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(IdleExit::Timeout);
        }

        tokio::select! {
            _ = stop.stopped() => return Ok(IdleExit::Stopped),
            _ = tokio::time::sleep(options.poll_interval.min(remaining)) => {}
        }

        timeout(COMMAND_TIMEOUT, session.noop())
            .await
            .map_err(|_| ImapError::Timeout("NOOP".to_string()))??;

        let unsolicited = &session.unsolicited_responses;
        if !forward_unsolicited(|| unsolicited.try_recv().ok(), updates).await {
            return Ok(IdleExit::Stopped);
        }
    }
}
