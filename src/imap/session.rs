// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::imap::error::ImapError;
use crate::imap::types::{IdleExit, IdleOptions, StopSignal, Update};

/// One live link to the server, from dial to logout.
///
/// A connection walks through login, select and idle in that order and is
/// never reused once it has been logged out.
#[async_trait]
pub trait Connection: Send {
    async fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError>;

    /// Opens `mailbox` read-only.
    async fn select(&mut self, mailbox: &str) -> Result<(), ImapError>;

    /// Holds a push subscription open on the selected mailbox, sending every
    /// server notification to `updates`.
    ///
    /// Returns when `stop` fires, when `options.logout_timeout` elapses, or
    /// with the error reported by the link. Sending blocks while the queue is
    /// full.
    async fn idle(
        &mut self,
        stop: &StopSignal,
        options: &IdleOptions,
        updates: &mpsc::Sender<Update>,
    ) -> Result<IdleExit, ImapError>;

    /// Ends the session. Safe to call in any state, including after a failure.
    async fn logout(&mut self) -> Result<(), ImapError>;
}

/// Creates new connections to a server address (`host:port`).
#[async_trait]
pub trait Dialer: Send + Sync {
    type Connection: Connection;

    async fn dial(&self, server: &str) -> Result<Self::Connection, ImapError>;
}
