use std::io;
use std::ops::RangeInclusive;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const CACHE_DIR_ENV_VAR: &str = "TYPST_MCP_CACHE_DIR";
const CACHE_DIR_NAME: &str = "typst-mcp";

/// Tuning knobs loaded from `--config`. Every field is optional in the file;
/// out-of-range values are clamped with a warning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub docs_build_timeout_secs: u64,
    pub docs_wait_timeout_secs: u64,
    pub package_fetch_timeout_secs: u64,
    pub pandoc_timeout_secs: u64,
    pub typst_compile_timeout_secs: u64,
    pub syntax_check_timeout_secs: u64,
    pub image_render_timeout_secs: u64,
    pub max_pdf_size_mb: u64,
    pub pdf_cleanup_age_hours: u64,
    pub package_search_max_results: usize,
    pub enable_background_docs_build: bool,
    pub optional_fetch_budget_ratio: f64,
    pub typst_source_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            docs_build_timeout_secs: 180,
            docs_wait_timeout_secs: 10,
            package_fetch_timeout_secs: 30,
            pandoc_timeout_secs: 30,
            typst_compile_timeout_secs: 60,
            syntax_check_timeout_secs: 30,
            image_render_timeout_secs: 60,
            max_pdf_size_mb: 50,
            pdf_cleanup_age_hours: 24,
            package_search_max_results: 20,
            enable_background_docs_build: true,
            optional_fetch_budget_ratio: 0.7,
            typst_source_dir: PathBuf::from("vendor/typst"),
        }
    }
}

fn clamp_field<T>(name: &str, value: &mut T, range: RangeInclusive<T>)
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let clamped = if *value < *range.start() {
        *range.start()
    } else if *value > *range.end() {
        *range.end()
    } else {
        return;
    };
    tracing::warn!(
        "{name} = {value} is outside {}..={}; using {clamped}",
        range.start(),
        range.end()
    );
    *value = clamped;
}

impl ServerConfig {
    /// Reads `path`. A missing file yields the defaults; a malformed one is an
    /// error.
    pub async fn load(path: &Path) -> io::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Self::from_toml(&contents).map_err(|err| {
                tracing::error!("Failed to parse {}: {err}", path.display());
                io::Error::new(io::ErrorKind::InvalidData, err)
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!("{} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => {
                tracing::error!("Failed to read {}: {err}", path.display());
                Err(err)
            }
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(contents)?;
        config.clamp();
        Ok(config)
    }

    fn clamp(&mut self) {
        clamp_field("docs_build_timeout_secs", &mut self.docs_build_timeout_secs, 30..=600);
        clamp_field("docs_wait_timeout_secs", &mut self.docs_wait_timeout_secs, 5..=60);
        clamp_field("package_fetch_timeout_secs", &mut self.package_fetch_timeout_secs, 5..=120);
        clamp_field("pandoc_timeout_secs", &mut self.pandoc_timeout_secs, 5..=120);
        clamp_field("typst_compile_timeout_secs", &mut self.typst_compile_timeout_secs, 5..=120);
        clamp_field("syntax_check_timeout_secs", &mut self.syntax_check_timeout_secs, 5..=120);
        clamp_field("image_render_timeout_secs", &mut self.image_render_timeout_secs, 5..=300);
        clamp_field("max_pdf_size_mb", &mut self.max_pdf_size_mb, 1..=500);
        clamp_field("pdf_cleanup_age_hours", &mut self.pdf_cleanup_age_hours, 0..=168);
        clamp_field("package_search_max_results", &mut self.package_search_max_results, 1..=100);
        if self.optional_fetch_budget_ratio.is_nan() {
            self.optional_fetch_budget_ratio = Self::default().optional_fetch_budget_ratio;
        }
        clamp_field("optional_fetch_budget_ratio", &mut self.optional_fetch_budget_ratio, 0.1..=0.95);
    }

    pub fn docs_build_timeout(&self) -> Duration {
        Duration::from_secs(self.docs_build_timeout_secs)
    }

    pub fn docs_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.docs_wait_timeout_secs)
    }

    pub fn package_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.package_fetch_timeout_secs)
    }

    pub fn pandoc_timeout(&self) -> Duration {
        Duration::from_secs(self.pandoc_timeout_secs)
    }

    pub fn typst_compile_timeout(&self) -> Duration {
        Duration::from_secs(self.typst_compile_timeout_secs)
    }

    pub fn syntax_check_timeout(&self) -> Duration {
        Duration::from_secs(self.syntax_check_timeout_secs)
    }

    pub fn image_render_timeout(&self) -> Duration {
        Duration::from_secs(self.image_render_timeout_secs)
    }

    pub fn max_pdf_bytes(&self) -> u64 {
        self.max_pdf_size_mb * 1024 * 1024
    }

    pub fn pdf_cleanup_age(&self) -> Duration {
        Duration::from_secs(self.pdf_cleanup_age_hours * 3600)
    }
}

/// `TYPST_MCP_CACHE_DIR` when set, otherwise the platform cache directory.
pub fn resolve_cache_dir(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = lookup(CACHE_DIR_ENV_VAR).filter(|dir| !dir.trim().is_empty()) {
        return PathBuf::from(dir.trim());
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_DIR_NAME)
}
