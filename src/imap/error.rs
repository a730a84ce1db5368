// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Failures observed on the link to the mail server.
///
/// Every variant is recoverable from the watcher's point of view: the
/// connection is torn down and re-dialed after the cooldown.
#[derive(Debug, Error, Clone)]
pub enum ImapError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid mailbox: {0}")]
    InvalidMailbox(String),

    #[error("Operation requires {0}")]
    InvalidState(&'static str),

    #[error("Idle error: {0}")]
    Idle(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Bad response: {0}")]
    BadResponse(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<async_imap::error::Error> for ImapError {
    fn from(err: async_imap::error::Error) -> Self {
        match err {
            async_imap::error::Error::Parse(e) => ImapError::Parse(e.to_string()),
            async_imap::error::Error::No(msg) => ImapError::Operation(msg),
            async_imap::error::Error::Bad(msg) => ImapError::BadResponse(msg),
            async_imap::error::Error::Io(e) => ImapError::Connection(e.to_string()),
            async_imap::error::Error::ConnectionLost => {
                ImapError::Connection("connection lost".to_string())
            }
            _ => ImapError::Unknown(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ImapError {
    fn from(err: std::io::Error) -> Self {
        ImapError::Connection(err.to_string())
    }
}

impl From<rustls::Error> for ImapError {
    fn from(err: rustls::Error) -> Self {
        ImapError::Tls(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_connection_errors() {
        let err: ImapError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer").into();
        assert!(matches!(err, ImapError::Connection(ref msg) if msg.contains("reset by peer")));
    }

    #[test]
    fn imap_no_response_maps_to_operation() {
        let err: ImapError = async_imap::error::Error::No("[AUTHENTICATIONFAILED] nope".into()).into();
        assert_eq!(err.to_string(), "Operation failed: [AUTHENTICATIONFAILED] nope");
    }
}
