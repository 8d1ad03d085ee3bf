//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::ElasticsearchSinkConfig;

/// 📦 The AppConfig: where the logs go, and how hard we try to get them there.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// 📡 The backend. Disabled unless someone says otherwise, out loud, in config.
    #[serde(default)]
    pub elasticsearch: ElasticsearchSinkConfig,
    /// 🎛️ Queue, batch and timing knobs.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🎛️ Pipeline tuning. Every default here is the number the system was built around;
/// change them and you own the consequences.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 🪣 How many records can wait for shipment at once.
    pub queue_capacity: usize,
    /// 🌡️ Occupancy percentage at which INFO-and-below stops being admitted.
    pub pressure_threshold_percent: usize,
    /// 📦 Flush as soon as a batch holds this many records.
    pub max_batch_size: usize,
    /// ⏱️ ...or as soon as this long has passed since the last flush.
    pub flush_interval_ms: u64,
    /// 💤 How long the consumer naps on an empty queue before re-checking.
    pub poll_timeout_ms: u64,
    /// ⏳ How long a producer waits for a free slot per attempt.
    pub offer_timeout_ms: u64,
    /// 🗑️ How many of the oldest records get evicted per failed attempt.
    pub eviction_chunk: usize,
    /// 🔁 How many evict-and-retry rounds before a record is dropped for good.
    pub max_eviction_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            pressure_threshold_percent: 80,
            max_batch_size: 128,
            flush_interval_ms: 1000,
            poll_timeout_ms: 200,
            offer_timeout_ms: 200,
            eviction_chunk: 16,
            max_eviction_rounds: 8,
        }
    }
}

impl RuntimeConfig {
    /// 🌡️ The occupancy at and above which the queue counts as "pressured".
    /// 256 at 80% is 204. Integer math, rounding down.
    pub fn pressure_threshold(&self) -> usize {
        self.queue_capacity.max(1) * self.pressure_threshold_percent.min(100) / 100
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn offer_timeout(&self) -> Duration {
        Duration::from_millis(self.offer_timeout_ms)
    }
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Environment variables (`LGX_*`, nested with `__`, e.g.
/// `LGX_ELASTICSEARCH__HOST`) form the base layer; the TOML file, if given, is merged
/// on top and wins on conflicts.
///
/// 💀 Returns an error only if the config is unparseable. A config that parses but
/// points nowhere useful is not an error here; `start()` decides that later, quietly.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("LGX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LGX_*). \
             The file exists in our hearts, but apparently not in a shape serde likes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LGX_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
