// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `fallback_filter`. Calling this more than once (or
/// after the host application installed its own subscriber) is a no-op.
pub fn init(fallback_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback_filter.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
