use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Tracing filter directive (e.g. `movdemux_media=debug`). `RUST_LOG`
    /// takes precedence when set.
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Print JSON instead of text
    #[serde(default)]
    pub json: bool,

    /// Default packet limit for `packets` (unlimited when unset)
    #[serde(default)]
    pub max_packets: Option<usize>,
}
