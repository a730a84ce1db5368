// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::OnceLock;

/// Version string shown by `--version`, e.g. `1.2.0 (commit: abc123, origin: ci)`.
///
/// The pieces come from `IMAP_NOTIFY_*` variables present at build time.
pub fn full_version() -> &'static str {
    static FULL_VERSION: OnceLock<String> = OnceLock::new();
    FULL_VERSION.get_or_init(|| {
        format_version(
            option_env!("IMAP_NOTIFY_VERSION"),
            option_env!("IMAP_NOTIFY_COMMIT"),
            option_env!("IMAP_NOTIFY_BUILD_TIME"),
            option_env!("IMAP_NOTIFY_ORIGIN"),
        )
    })
}

fn format_version(
    version: Option<&str>,
    commit: Option<&str>,
    build_time: Option<&str>,
    origin: Option<&str>,
) -> String {
    let info: Vec<String> = [("commit", commit), ("build time", build_time), ("origin", origin)]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}: {}", label, v))
        })
        .collect();

    let mut text = version
        .filter(|v| !v.is_empty())
        .unwrap_or(env!("CARGO_PKG_VERSION"))
        .to_string();
    if !info.is_empty() {
        text.push_str(&format!(" ({})", info.join(", ")));
    }
    text
}
