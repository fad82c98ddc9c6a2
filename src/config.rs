use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{MobileClawError, MobileClawResult};
use crate::launcher::aliases::AliasSpec;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "MOBILECLAW_CONFIG";

/// Session-scoped configuration. Read once at startup, never hot-reloaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub settle: SettleConfig,
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> MobileClawResult<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make the mapper or executor meaningless.
    pub fn validate(&self) -> MobileClawResult<()> {
        if self.render.width == Some(0) || self.render.height == Some(0) {
            return Err(MobileClawError::Config(
                "render width and height must be non-zero when set".into(),
            ));
        }
        if self.render.width.is_some() != self.render.height.is_some() {
            return Err(MobileClawError::Config(
                "render width and height must be set together".into(),
            ));
        }
        if !matches!(self.render.rotation, 0 | 90 | 180 | 270) {
            return Err(MobileClawError::Config(format!(
                "rotation must be one of 0/90/180/270, got {}",
                self.render.rotation
            )));
        }
        if !(self.executor.scroll_frac > 0.0 && self.executor.scroll_frac <= 1.0) {
            return Err(MobileClawError::Config(format!(
                "scroll_frac must be in (0, 1], got {}",
                self.executor.scroll_frac
            )));
        }
        let seconds = [
            ("executor.long_press_s", self.executor.long_press_s),
            ("executor.drag_s", self.executor.drag_s),
            ("executor.swipe_s", self.executor.swipe_s),
            ("executor.wait_s", self.executor.wait_s),
            ("settle.duration_factor", self.settle.duration_factor),
        ];
        for (key, value) in seconds {
            if !value.is_finite() || value < 0.0 {
                return Err(MobileClawError::Config(format!(
                    "{key} must be a finite value >= 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// adb serial; `None` lets adb pick the only attached device.
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Used when the device refuses to report its window size.
    #[serde(default = "default_fallback_width")]
    pub fallback_width: u32,
    #[serde(default = "default_fallback_height")]
    pub fallback_height: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            adb_path: default_adb_path(),
            command_timeout_ms: default_command_timeout_ms(),
            fallback_width: default_fallback_width(),
            fallback_height: default_fallback_height(),
        }
    }
}

fn default_adb_path() -> String {
    "adb".into()
}

fn default_command_timeout_ms() -> u64 {
    20_000
}

fn default_fallback_width() -> u32 {
    1080
}

fn default_fallback_height() -> u32 {
    1920
}

/// Geometry of the image the decision model sees.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Fixed render size. Unset means the size of each captured screenshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// `[offset_x, offset_y, width, height]`; zero/negative size means the whole frame.
    #[serde(default)]
    pub valid_region: [i32; 4],
    /// Degrees the render frame is rotated relative to the device.
    #[serde(default)]
    pub rotation: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_long_press_s")]
    pub long_press_s: f64,
    #[serde(default = "default_drag_s")]
    pub drag_s: f64,
    #[serde(default = "default_swipe_s")]
    pub swipe_s: f64,
    /// Scroll displacement as a fraction of the render frame edge.
    #[serde(default = "default_scroll_frac")]
    pub scroll_frac: f64,
    /// `wait()` always sleeps this long; the model's own argument is ignored.
    #[serde(default = "default_wait_s")]
    pub wait_s: f64,
    /// Log commands instead of sending them.
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            long_press_s: default_long_press_s(),
            drag_s: default_drag_s(),
            swipe_s: default_swipe_s(),
            scroll_frac: default_scroll_frac(),
            wait_s: default_wait_s(),
            dry_run: true,
        }
    }
}

fn default_long_press_s() -> f64 {
    0.6
}

fn default_drag_s() -> f64 {
    0.40
}

fn default_swipe_s() -> f64 {
    0.25
}

fn default_scroll_frac() -> f64 {
    0.28
}

fn default_wait_s() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleConfig {
    #[serde(default = "default_base_settle_ms")]
    pub base_ms: u64,
    /// Extra settle per second of declared gesture duration.
    #[serde(default = "default_duration_factor")]
    pub duration_factor: f64,
    /// Per-kind overrides merged over the built-in table.
    #[serde(default)]
    pub extras: HashMap<String, u64>,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_settle_ms(),
            duration_factor: default_duration_factor(),
            extras: HashMap::new(),
        }
    }
}

fn default_base_settle_ms() -> u64 {
    200
}

fn default_duration_factor() -> f64 {
    0.6
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Foreground stabilization budget.
    #[serde(default = "default_launch_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How many times the assistant guard may retry a single step.
    #[serde(default = "default_guard_retries")]
    pub guard_retries: u32,
    #[serde(default = "default_search_polls")]
    pub search_polls: u32,
    #[serde(default = "default_enter_polls")]
    pub enter_polls: u32,
    /// Caller aliases; these win over the built-in table.
    #[serde(default)]
    pub aliases: BTreeMap<String, AliasSpec>,
    /// Home-screen packages that never count as a launched app.
    #[serde(default)]
    pub launcher_packages: Vec<String>,
    #[serde(default = "default_assistant_packages")]
    pub assistant_packages: Vec<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_launch_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            guard_retries: default_guard_retries(),
            search_polls: default_search_polls(),
            enter_polls: default_enter_polls(),
            aliases: BTreeMap::new(),
            launcher_packages: Vec::new(),
            assistant_packages: default_assistant_packages(),
        }
    }
}

fn default_launch_timeout_ms() -> u64 {
    8_000
}

fn default_poll_interval_ms() -> u64 {
    350
}

fn default_guard_retries() -> u32 {
    2
}

fn default_search_polls() -> u32 {
    12
}

fn default_enter_polls() -> u32 {
    6
}

fn default_assistant_packages() -> Vec<String> {
    vec![
        "com.google.android.googlequicksearchbox".into(),
        "com.google.android.apps.googleassistant".into(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_recovery_delay_ms")]
    pub health_delay_ms: u64,
    #[serde(default = "default_recovery_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            health_delay_ms: default_recovery_delay_ms(),
            reconnect_delay_ms: default_recovery_delay_ms(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    350
}

fn default_recovery_delay_ms() -> u64 {
    400
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Image/response pairs replayed to the model each turn.
    #[serde(default = "default_history_n")]
    pub history_n: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            history_n: default_history_n(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_history_n() -> usize {
    3
}

fn default_max_steps() -> u32 {
    20
}

fn resolve_config_path() -> MobileClawResult<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found via {CONFIG_ENV}");
            return Ok(candidate);
        }
        return Err(MobileClawError::Config(format!(
            "{CONFIG_ENV} points at {} which does not exist",
            candidate.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(MobileClawError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> MobileClawResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = AppConfig::from_toml_str(&content)?;
    tracing::info!(
        path = %path.display(),
        dry_run = config.executor.dry_run,
        aliases = config.launcher.aliases.len(),
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> MobileClawResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.render.width, None);
        assert_eq!(cfg.render.height, None);
        assert!(cfg.executor.dry_run);
        assert_eq!(cfg.settle.base_ms, 200);
        assert_eq!(cfg.agent.history_n, 3);
        assert_eq!(cfg.launcher.assistant_packages.len(), 2);
    }

    #[test]
    fn sections_and_aliases_parse() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [render]
            width = 1920
            height = 1080
            valid_region = [0, 60, 1920, 960]
            rotation = 90

            [executor]
            dry_run = false
            scroll_frac = 0.3

            [settle.extras]
            click = 50

            [launcher.aliases]
            notes = "com.example.notes"
            display = "intent:android.settings.DISPLAY_SETTINGS"
            clock = { package = "com.google.android.deskclock" }
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.rotation, 90);
        assert_eq!(cfg.render.valid_region, [0, 60, 1920, 960]);
        assert!(!cfg.executor.dry_run);
        assert_eq!(cfg.settle.extras.get("click"), Some(&50));
        assert_eq!(cfg.launcher.aliases.len(), 3);
    }

    #[test]
    fn bad_rotation_is_rejected() {
        let err = AppConfig::from_toml_str("[render]\nrotation = 45\n").unwrap_err();
        assert!(matches!(err, MobileClawError::Config(_)));
    }

    #[test]
    fn rotation_outside_one_turn_is_rejected() {
        assert!(AppConfig::from_toml_str("[render]\nrotation = 450\n").is_err());
    }

    #[test]
    fn half_set_render_size_is_rejected() {
        assert!(AppConfig::from_toml_str("[render]\nwidth = 1080\n").is_err());
    }

    #[test]
    fn non_finite_or_negative_durations_are_rejected() {
        assert!(AppConfig::from_toml_str("[executor]\nwait_s = inf\n").is_err());
        assert!(AppConfig::from_toml_str("[executor]\nswipe_s = nan\n").is_err());
        assert!(AppConfig::from_toml_str("[executor]\ndrag_s = -0.1\n").is_err());
        assert!(AppConfig::from_toml_str("[executor]\nwait_s = 0.0\n").is_ok());
    }

    #[test]
    fn zero_scroll_fraction_is_rejected() {
        assert!(AppConfig::from_toml_str("[executor]\nscroll_frac = 0.0\n").is_err());
    }
}
