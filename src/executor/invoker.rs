//! Sequential command runner with per-kind settle delays.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SettleConfig;
use crate::device::DeviceLink;
use crate::errors::MobileClawResult;
use crate::executor::commands::Command;
use crate::launcher::{AppLauncher, LaunchOutcome};

/// Extra settle per command kind, in milliseconds.
const DEFAULT_EXTRAS: &[(&str, u64)] = &[
    // The launcher already waited for the foreground; this is UI buffer only.
    ("open_app", 210),
    ("type", 200),
    ("type_submit", 400),
    ("swipe", 200),
    ("drag", 250),
    ("long_press", 150),
    ("click", 120),
    ("press_home", 120),
    ("press_back", 120),
    ("finished", 0),
];

const DEFAULT_EXTRA_MS: u64 = 180;

/// One entry per attempted command. `index` is 1-based and contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub ok: bool,
    pub name: String,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<LaunchOutcome>,
}

impl ExecutionResult {
    /// `{ok: true, name, index}` for steps that were not sent to a device.
    pub fn synthetic(name: &str, index: usize) -> Self {
        Self {
            ok: true,
            name: name.to_string(),
            index,
            detail: None,
            error: None,
            launch: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettleTable {
    base_ms: u64,
    duration_factor: f64,
    extras: HashMap<String, u64>,
}

impl SettleTable {
    pub fn from_config(config: &SettleConfig) -> Self {
        let mut extras: HashMap<String, u64> = DEFAULT_EXTRAS
            .iter()
            .map(|(kind, ms)| (kind.to_string(), *ms))
            .collect();
        extras.extend(config.extras.iter().map(|(k, v)| (k.clone(), *v)));
        Self {
            base_ms: config.base_ms,
            duration_factor: config.duration_factor.max(0.0),
            extras,
        }
    }

    pub fn extra_ms(&self, key: &str) -> u64 {
        self.extras
            .get(key)
            .or_else(|| self.extras.get("default"))
            .copied()
            .unwrap_or(DEFAULT_EXTRA_MS)
    }

    /// `base + extra(kind) + round(duration_s * 1000 * factor)`
    pub fn settle_ms(&self, command: &Command) -> u64 {
        let dynamic = (command.duration().max(0.0) * 1000.0 * self.duration_factor).round() as u64;
        self.base_ms + self.extra_ms(command.settle_key()) + dynamic
    }
}

impl Default for SettleTable {
    fn default() -> Self {
        Self::from_config(&SettleConfig::default())
    }
}

pub struct Invoker {
    link: Arc<dyn DeviceLink>,
    launcher: Arc<AppLauncher>,
    settle: SettleTable,
}

impl Invoker {
    pub fn new(link: Arc<dyn DeviceLink>, launcher: Arc<AppLauncher>, settle: SettleTable) -> Self {
        Self {
            link,
            launcher,
            settle,
        }
    }

    pub fn settle(&self) -> &SettleTable {
        &self.settle
    }

    /// Executes in order and waits out each command's settle time. A command
    /// that raises stops the run and the error propagates.
    pub async fn run(&self, commands: &[Command]) -> MobileClawResult<Vec<ExecutionResult>> {
        let mut results = Vec::with_capacity(commands.len());
        for (i, command) in commands.iter().enumerate() {
            let index = i + 1;
            let outcome = command.execute(self.link.as_ref(), &self.launcher).await?;
            let result = ExecutionResult {
                ok: outcome.ok,
                name: command.name().to_string(),
                index,
                detail: outcome.detail,
                error: outcome.error,
                launch: outcome.launch,
            };

            let note = result.detail.as_deref().or(result.error.as_deref()).unwrap_or("");
            if result.ok {
                tracing::info!(index, name = %result.name, "[ok] {note}");
            } else {
                tracing::warn!(index, name = %result.name, "[fail] {note}");
            }
            results.push(result);

            let settle_ms = self.settle.settle_ms(command);
            tracing::debug!(index, settle_ms, "waiting for ui to settle");
            tokio::time::sleep(Duration::from_millis(settle_ms)).await;
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LauncherConfig;
    use crate::device::fake::{DeviceCall, FakeDevice};
    use crate::executor::coordinator::DevicePoint;
    use tokio::time::Instant;

    fn p(x: i32, y: i32) -> DevicePoint {
        DevicePoint { x, y }
    }

    fn invoker(link: Arc<FakeDevice>) -> Invoker {
        let launcher = Arc::new(AppLauncher::new(link.clone(), LauncherConfig::default()));
        Invoker::new(link, launcher, SettleTable::default())
    }

    #[test]
    fn settle_formula_matches_defaults() {
        let table = SettleTable::default();
        assert_eq!(table.settle_ms(&Command::Click { at: p(0, 0) }), 320);
        assert_eq!(table.settle_ms(&Command::Type { content: "a\n".into() }), 600);
        // 200 + 200 + round(0.25 * 1000 * 0.6)
        assert_eq!(
            table.settle_ms(&Command::Swipe { from: p(0, 0), to: p(1, 1), duration: 0.25 }),
            550
        );
        assert_eq!(table.settle_ms(&Command::Finished { content: String::new() }), 200);
    }

    #[test]
    fn config_overrides_merge_over_defaults() {
        let mut config = SettleConfig::default();
        config.extras.insert("click".into(), 0);
        config.extras.insert("default".into(), 50);
        let table = SettleTable::from_config(&config);
        assert_eq!(table.extra_ms("click"), 0);
        assert_eq!(table.extra_ms("drag"), 250);
        assert_eq!(table.extra_ms("something_new"), 50);
        assert_eq!(SettleTable::default().extra_ms("something_new"), 180);
    }

    #[test]
    fn longer_gestures_never_settle_less() {
        let table = SettleTable::default();
        let mut previous = 0;
        for step in 0..=40 {
            let duration = step as f64 * 0.05;
            let ms = table.settle_ms(&Command::Drag { from: p(0, 0), to: p(9, 9), duration });
            assert!(ms >= previous, "{duration}s settled {ms} < {previous}");
            previous = ms;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_in_order_with_contiguous_indices() {
        let link = Arc::new(FakeDevice::new());
        let started = Instant::now();
        let results = invoker(link.clone())
            .run(&[
                Command::Click { at: p(1, 2) },
                Command::PressBack,
                Command::Finished { content: "ok".into() },
            ])
            .await
            .unwrap();

        let seq: Vec<_> = results.iter().map(|r| (r.index, r.name.as_str())).collect();
        assert_eq!(seq, vec![(1, "click"), (2, "press_back"), (3, "finished")]);
        assert_eq!(results[2].detail.as_deref(), Some("ok"));
        assert_eq!(link.calls(), vec![DeviceCall::Click { x: 1, y: 2 }, DeviceCall::PressBack]);
        assert!(started.elapsed() >= Duration::from_millis(320 + 320 + 200));
    }

    #[tokio::test(start_paused = true)]
    async fn a_raising_command_stops_the_run() {
        let link = Arc::new(FakeDevice::new().with_failing_gestures());
        let err = invoker(link.clone())
            .run(&[Command::Click { at: p(1, 2) }, Command::PressHome])
            .await;
        assert!(err.is_err());
        assert!(!link.calls().contains(&DeviceCall::PressHome));
    }

    #[test]
    fn optional_keys_are_omitted() {
        let json = serde_json::to_value(ExecutionResult::synthetic("click", 1)).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true, "name": "click", "index": 1}));
    }
}
