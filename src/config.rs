// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Kernel configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file looked up by [`KernelConfig::load`]
pub const CONFIG_FILE: &str = "polyframe.toml";

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Background rebuild workers (None = one per core)
    pub worker_threads: Option<usize>,
    /// Longest time a caller waits for an in-flight rebuild before moving on
    pub rebuild_wait: Duration,
    /// Distance under which CSG output vertices are merged
    pub weld_tolerance: f64,
    /// Maximum chord error when flattening curves, in millimeters
    pub curve_tolerance: f64,
    /// Fallback tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            worker_threads: None, // Auto-detect
            rebuild_wait: Duration::from_secs(3),
            weld_tolerance: 1e-5,
            curve_tolerance: 0.1,
            log_filter: "polyframe_scene=info".to_string(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: KernelConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from(CONFIG_FILE).exists() {
            Self::from_file(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply POLYFRAME_* environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(workers) = std::env::var("POLYFRAME_WORKERS") {
            self.worker_threads = workers.parse().ok().filter(|&n: &usize| n > 0);
        }

        if let Ok(wait) = std::env::var("POLYFRAME_REBUILD_WAIT_MS") {
            if let Ok(ms) = wait.parse() {
                self.rebuild_wait = Duration::from_millis(ms);
            }
        }

        if let Ok(filter) = std::env::var("POLYFRAME_LOG") {
            self.log_filter = filter;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }
}
