// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Connection lifecycle: dial, login, select, idle, tear down, wait, repeat.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::time::sleep;

use crate::imap::session::{Connection, Dialer};
use crate::imap::types::{IdleOptions, StopSignal};
use crate::listener::{EventHandler, EventListener};

/// Fixed wait before every reconnect. There is no growth and no ceiling.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Where and as whom to connect. Immutable for the process lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub server: String,
    pub username: String,
    pub password: String,
    pub mailbox: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherOptions {
    pub cooldown: Duration,
    pub idle: IdleOptions,
}

impl WatcherOptions {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            idle: IdleOptions::new(check_interval),
        }
    }
}

/// Lifecycle position of the single active connection.
pub enum State<C> {
    Connecting,
    Authenticating(C),
    Selecting(C),
    Idling(C),
}

impl<C> State<C> {
    pub fn name(&self) -> &'static str {
        match self {
            State::Connecting => "Connecting",
            State::Authenticating(_) => "Authenticating",
            State::Selecting(_) => "Selecting",
            State::Idling(_) => "Idling",
        }
    }
}

impl<C> fmt::Debug for State<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owns the connection lifecycle and recovers from every failure by tearing
/// the link down and starting over after [`WatcherOptions::cooldown`].
pub struct Watcher<D: Dialer> {
    dialer: D,
    credentials: Credentials,
    options: WatcherOptions,
    listener: EventListener,
    handler: Arc<dyn EventHandler>,
}

impl<D: Dialer> Watcher<D> {
    pub fn new(
        dialer: D,
        credentials: Credentials,
        options: WatcherOptions,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            dialer,
            credentials,
            listener: EventListener::new(options.idle),
            options,
            handler,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Drives the state machine forever.
    pub async fn run_forever(&self) {
        let mut state = State::Connecting;
        loop {
            state = self.step(state).await;
        }
    }

    /// Performs one transition.
    pub async fn step(&self, state: State<D::Connection>) -> State<D::Connection> {
        match state {
            State::Connecting => {
                info!("Connecting to IMAP server: {}", self.credentials.server);
                match self.dialer.dial(&self.credentials.server).await {
                    Ok(connection) => State::Authenticating(connection),
                    Err(e) => {
                        error!("Error connecting to IMAP server: {}", e);
                        self.cooldown().await;
                        State::Connecting
                    }
                }
            }
            State::Authenticating(mut connection) => {
                info!("Logging in with user: {}", self.credentials.username);
                match connection
                    .login(&self.credentials.username, &self.credentials.password)
                    .await
                {
                    Ok(()) => State::Selecting(connection),
                    Err(e) => {
                        error!("Error logging in: {}", e);
                        self.reconnect(connection).await
                    }
                }
            }
            State::Selecting(mut connection) => {
                info!("Selecting mailbox: {}", self.credentials.mailbox);
                match connection.select(&self.credentials.mailbox).await {
                    Ok(()) => State::Idling(connection),
                    Err(e) => {
                        error!("Error selecting mailbox: {}", e);
                        self.reconnect(connection).await
                    }
                }
            }
            State::Idling(mut connection) => {
                let stop = StopSignal::new();
                match self
                    .listener
                    .idle(&mut connection, &stop, Arc::clone(&self.handler))
                    .await
                {
                    Ok(exit) => info!("Idle session ended ({:?})", exit),
                    Err(e) => error!("Idling failed: {}", e),
                }
                self.reconnect(connection).await
            }
        }
    }

    /// Logs out, drops the connection and waits out the cooldown.
    async fn reconnect(&self, mut connection: D::Connection) -> State<D::Connection> {
        if let Err(e) = connection.logout().await {
            warn!("Error logging out: {}", e);
        }
        drop(connection);
        self.cooldown().await;
        State::Connecting
    }

    async fn cooldown(&self) {
        info!("Reconnecting in {:?}", self.options.cooldown);
        sleep(self.options.cooldown).await;
    }
}
