use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::device::{DeviceLink, ForegroundApp};
use crate::errors::MobileClawResult;

#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub max_wait_ms: u64,
    pub check_interval_ms: u64,
    /// Consecutive identical observations needed.
    pub min_stable_polls: usize,
    /// Packages that never count as "the app", e.g. home screens and assistants.
    pub excluded_packages: HashSet<String>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 8_000,
            check_interval_ms: 350,
            min_stable_polls: 2,
            excluded_packages: HashSet::new(),
        }
    }
}

/// Tracks foreground observations until the same app is seen on enough
/// consecutive eligible polls.
pub struct ForegroundStabilityDetector {
    config: StabilityConfig,
    last: Option<ForegroundApp>,
    stable_hits: usize,
}

impl ForegroundStabilityDetector {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            last: None,
            stable_hits: 0,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.stable_hits = 0;
    }

    pub fn is_eligible(&self, app: &ForegroundApp) -> bool {
        !app.package.is_empty() && !self.config.excluded_packages.contains(&app.package)
    }

    /// Feeds one poll. Ineligible observations leave the streak untouched.
    pub fn is_stable(&mut self, observed: Option<&ForegroundApp>) -> bool {
        let Some(app) = observed.filter(|a| self.is_eligible(a)) else {
            return false;
        };

        if self.last.as_ref() == Some(app) {
            self.stable_hits += 1;
        } else {
            self.stable_hits = 1;
            self.last = Some(app.clone());
        }
        self.stable_hits >= self.config.min_stable_polls
    }
}

/// Polls the foreground app until it settles, or returns whatever is in front
/// once `max_wait_ms` runs out.
pub async fn wait_for_foreground_stability(
    link: &dyn DeviceLink,
    config: StabilityConfig,
) -> MobileClawResult<ForegroundApp> {
    let max_wait = Duration::from_millis(config.max_wait_ms);
    let interval = Duration::from_millis(config.check_interval_ms);
    let mut detector = ForegroundStabilityDetector::new(config);
    let start_time = Instant::now();

    while start_time.elapsed() < max_wait {
        let observed = match link.foreground_app().await {
            Ok(app) => app,
            Err(e) => {
                tracing::debug!(error = %e, "foreground poll failed");
                None
            }
        };

        if detector.is_stable(observed.as_ref()) {
            let app = observed.unwrap_or_default();
            tracing::debug!(app = %app, elapsed = ?start_time.elapsed(), "foreground stable");
            return Ok(app);
        }

        tokio::time::sleep(interval).await;
    }

    let current = link.foreground_app().await?.unwrap_or_default();
    tracing::warn!(app = %current, elapsed = ?start_time.elapsed(), "foreground stability timeout");
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeDevice;

    fn app(pkg: &str) -> ForegroundApp {
        ForegroundApp::new(pkg, ".Main")
    }

    fn config_excluding(pkgs: &[&str]) -> StabilityConfig {
        StabilityConfig {
            excluded_packages: pkgs.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn two_identical_eligible_polls_are_stable() {
        let mut d = ForegroundStabilityDetector::new(config_excluding(&["com.launcher"]));
        assert!(!d.is_stable(Some(&app("com.launcher"))));
        assert!(!d.is_stable(Some(&app("com.a"))));
        assert!(!d.is_stable(None));
        assert!(d.is_stable(Some(&app("com.a"))));
    }

    #[test]
    fn a_different_app_restarts_the_streak() {
        let mut d = ForegroundStabilityDetector::new(StabilityConfig::default());
        assert!(!d.is_stable(Some(&app("com.a"))));
        assert!(!d.is_stable(Some(&app("com.b"))));
        assert!(d.is_stable(Some(&app("com.b"))));
        d.reset();
        assert!(!d.is_stable(Some(&app("com.b"))));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_launcher_frames() {
        let link = FakeDevice::new()
            .with_foreground(app("com.target"))
            .script_foreground(vec![Some(app("com.launcher")), Some(app("com.launcher")), None]);
        let got = wait_for_foreground_stability(&link, config_excluding(&["com.launcher"]))
            .await
            .unwrap();
        assert_eq!(got, app("com.target"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_current_foreground() {
        let link = FakeDevice::new().with_foreground(app("com.launcher"));
        let started = Instant::now();
        let got = wait_for_foreground_stability(&link, config_excluding(&["com.launcher"]))
            .await
            .unwrap();
        assert_eq!(got, app("com.launcher"));
        assert!(started.elapsed() >= Duration::from_millis(8_000));
    }
}
