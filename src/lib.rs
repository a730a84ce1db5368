// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Library core for imap-notify: watch one IMAP mailbox and run a command
//! whenever the server reports a change.

// --- Modules ---
pub mod command;
pub mod config;
pub mod imap;
pub mod listener;
pub mod version;
pub mod watcher;

pub mod prelude {
    // Config
    pub use crate::config::{Cli, Settings, SettingsError};

    // IMAP
    pub use crate::imap::{
        Connection, Dialer, IdleExit, IdleOptions, ImapError, StopSignal, TlsDialer, Update,
    };

    // Lifecycle
    pub use crate::command::{Command, CommandError, CommandRunner};
    pub use crate::listener::{Event, EventHandler, EventListener};
    pub use crate::watcher::{Credentials, State, Watcher, WatcherOptions};

    // Common Libs
    pub use log::{debug, error, info, trace, warn};
    pub use std::sync::Arc;
}
