use crate::error::{EtlError, EtlResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── Source ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// SQLite database holding the rental schema. `:memory:` is accepted.
    pub database_path: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            database_path: "rental.db".into(),
        }
    }
}

// ── Aggregation policy ─────────────────────────────────────────────

/// What to do when the source yields zero rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyInputPolicy {
    /// Produce well-formed empty tables.
    #[default]
    Allow,
    /// Fail the run with `EtlError::EmptyInput`.
    Reject,
}

// ── Chart ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Fixed chart title. When unset it follows `top_n`.
    pub title: Option<String>,
    pub x_axis: String,
    pub y_axis: String,
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        // 20cm x 12cm at 96 dpi.
        Self {
            title: None,
            x_axis: "Country".into(),
            y_axis: "Revenue".into(),
            width_px: 756,
            height_px: 454,
        }
    }
}

impl ChartConfig {
    pub fn title_for(&self, top_n: usize) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("Top {top_n} countries by revenue"))
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub source: SourceConfig,
    pub export_path: PathBuf,
    pub report_path: PathBuf,
    /// `env_logger` filter directive, e.g. `info` or `rental_etl_core=debug`.
    pub log_filter: String,
    pub empty_input: EmptyInputPolicy,
    /// Row limit of the dashboard's country ranking.
    pub top_n: usize,
    pub chart: ChartConfig,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            export_path: PathBuf::from("output/rental_summary.csv"),
            report_path: PathBuf::from("dashboard/rental_dashboard.xlsx"),
            log_filter: "info".into(),
            empty_input: EmptyInputPolicy::Allow,
            top_n: 10,
            chart: ChartConfig::default(),
        }
    }
}

impl EtlConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: EtlConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// In-memory source, outputs under `out_dir`.
    pub fn default_test(out_dir: impl AsRef<Path>) -> Self {
        let out_dir = out_dir.as_ref();
        Self {
            source: SourceConfig {
                database_path: ":memory:".into(),
            },
            export_path: out_dir.join("summary.csv"),
            report_path: out_dir.join("dashboard.xlsx"),
            log_filter: "debug".into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> EtlResult<()> {
        if self.top_n == 0 {
            return Err(EtlError::Config("top_n must be at least 1".into()));
        }
        if self.export_path == self.report_path {
            return Err(EtlError::Config(format!(
                "export and report both target {}",
                self.export_path.display()
            )));
        }
        Ok(())
    }
}
