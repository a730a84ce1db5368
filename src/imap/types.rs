// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;
use std::time::Duration;

use async_imap::imap_proto::{MailboxDatum, Response};
use async_imap::types::UnsolicitedResponse;
use tokio_util::sync::CancellationToken;

/// Default ceiling on a single idle subscription before the session is renewed.
pub const DEFAULT_LOGOUT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Capacity of the per-connection update queue.
pub const UPDATE_QUEUE_CAPACITY: usize = 32;

/// A notification pushed by the server while a mailbox is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// The mailbox size changed (EXISTS or RECENT).
    Mailbox,
    /// A message was expunged.
    Expunge,
    /// Flags or other message attributes changed (FETCH).
    Message,
    /// Anything else, e.g. a keep-alive `* OK Still here` answering a poll.
    /// Inside IDLE, async-imap consumes keep-alives before they reach us.
    Status(String),
}

impl Update {
    /// Whether this update may indicate new mail.
    pub fn is_mailbox_change(&self) -> bool {
        matches!(self, Update::Mailbox)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Update::Mailbox => "MailboxUpdate",
            Update::Expunge => "ExpungeUpdate",
            Update::Message => "MessageUpdate",
            Update::Status(_) => "StatusUpdate",
        }
    }

    /// Classifies a response returned by an IDLE wait.
    pub fn from_response(response: &Response<'_>) -> Self {
        match response {
            Response::MailboxData(MailboxDatum::Exists(_))
            | Response::MailboxData(MailboxDatum::Recent(_)) => Update::Mailbox,
            Response::Expunge(_) => Update::Expunge,
            Response::Fetch(..) => Update::Message,
            Response::Data { information, .. } => Update::Status(
                information
                    .as_ref()
                    .map(|info| info.to_string())
                    .unwrap_or_default(),
            ),
            other => Update::Status(format!("{:?}", other)),
        }
    }

    /// Classifies a response async-imap queued on the session: everything
    /// seen while polling, and anything read while entering or leaving IDLE.
    pub fn from_unsolicited(response: &UnsolicitedResponse) -> Self {
        match response {
            UnsolicitedResponse::Exists(_) | UnsolicitedResponse::Recent(_) => Update::Mailbox,
            UnsolicitedResponse::Expunge(_) => Update::Expunge,
            other => Update::Status(format!("{:?}", other)),
        }
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Tuning for one idle subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleOptions {
    /// Hard ceiling on how long the subscription may stay open.
    pub logout_timeout: Duration,
    /// NOOP cadence when the server lacks the IDLE capability.
    pub poll_interval: Duration,
}

impl IdleOptions {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            logout_timeout: DEFAULT_LOGOUT_TIMEOUT,
            poll_interval,
        }
    }
}

/// Why an idle subscription ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleExit {
    Stopped,
    Timeout,
}

/// One-shot, idempotent broadcast that ends an idle subscription and its
/// dispatch task. A fresh signal is created for every connection.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Calling this more than once has no further effect.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`StopSignal::stop`] has been called.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}
