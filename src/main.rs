// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::process::exit;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use imap_notify::command::CommandRunner;
use imap_notify::config::{Cli, Settings};
use imap_notify::imap::TlsDialer;
use imap_notify::watcher::{Watcher, WatcherOptions};

fn init_logger() {
    let default_level = match std::env::var("DEBUG").as_deref() {
        Ok("1") => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file
    dotenvy::dotenv().ok();
    init_logger();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            eprint!("{}", e);
            exit(1);
        }
    };

    let settings = Settings::load(cli).unwrap_or_else(|err| {
        eprintln!("{}", err);
        exit(1);
    });

    let runner = CommandRunner::new(settings.command.clone());
    let watcher = Watcher::new(
        TlsDialer::new(),
        settings.credentials,
        WatcherOptions::new(settings.check_interval),
        Arc::new(runner),
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(e) => {
                error!("Unable to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = watcher.run_forever() => {}
        _ = shutdown => {}
    }
}
