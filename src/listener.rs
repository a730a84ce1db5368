// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Idle subscription plus the dispatch task that turns mailbox changes into
//! handler calls.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::sync::mpsc;

use crate::imap::error::ImapError;
use crate::imap::session::Connection;
use crate::imap::types::{IdleExit, IdleOptions, StopSignal, Update, UPDATE_QUEUE_CAPACITY};

/// "The selected mailbox changed in a way that may indicate new mail."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event;

/// Receives one call per dispatched [`Event`], in server order.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event);
}

#[derive(Debug, Clone)]
pub struct EventListener {
    options: IdleOptions,
}

impl EventListener {
    pub fn new(options: IdleOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IdleOptions {
        &self.options
    }

    /// Runs one idle subscription on an authenticated, selected connection.
    ///
    /// A fresh bounded queue feeds a dispatch task that calls `handler` for
    /// every mailbox change. Returns once the subscription ends (stop,
    /// logout timeout or link error) and the dispatch task has exited. It
    /// never retries; the caller tears the connection down.
    pub async fn idle<C>(
        &self,
        connection: &mut C,
        stop: &StopSignal,
        handler: Arc<dyn EventHandler>,
    ) -> Result<IdleExit, ImapError>
    where
        C: Connection + ?Sized,
    {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
        let dispatcher = tokio::spawn(dispatch(updates_rx, stop.clone(), handler));

        info!("Entering idle mode...");
        let result = connection.idle(stop, &self.options, &updates_tx).await;
        match &result {
            Ok(exit) => debug!("Idle subscription ended: {:?}", exit),
            Err(e) => debug!("Idle subscription failed: {}", e),
        }

        stop.stop();
        drop(updates_tx);
        if let Err(e) = dispatcher.await {
            error!("Dispatch task failed: {}", e);
        }
        result
    }
}

/// Drains the queue until it closes or `stop` fires with nothing left queued.
async fn dispatch(
    mut updates: mpsc::Receiver<Update>,
    stop: StopSignal,
    handler: Arc<dyn EventHandler>,
) {
    loop {
        tokio::select! {
            biased;
            update = updates.recv() => match update {
                Some(update) => {
                    info!("Received IMAP update: {}", update);
                    if update.is_mailbox_change() {
                        handler.handle(Event).await;
                    }
                }
                None => break,
            },
            _ = stop.stopped() => break,
        }
    }
}
