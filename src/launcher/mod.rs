//! App launching: alias resolution, ordered launch strategies and foreground
//! verification.
pub mod aliases;
pub mod search;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::config::LauncherConfig;
use crate::device::{DeviceLink, ForegroundApp, ShellOutput};
use crate::errors::{MobileClawError, MobileClawResult};
use crate::fallback::first_success;
use crate::perception::stability::{wait_for_foreground_stability, StabilityConfig};

use aliases::{AliasTable, AliasTarget};
use search::{drawer_search_selectors, home_search_selectors, LauncherSearch};

/// What the device reported in front once the launch settled.
pub type LaunchOutcome = ForegroundApp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    Package(String),
    Intent(String),
    /// Unresolved human label; only launcher search can find it.
    Label(String),
}

impl LaunchTarget {
    /// Strategies tried in order. Intents never fall through to search.
    pub fn strategies(&self) -> &'static [LaunchStrategy] {
        match self {
            LaunchTarget::Package(_) => &[LaunchStrategy::DirectStart, LaunchStrategy::LaunchIntent],
            LaunchTarget::Intent(_) => &[LaunchStrategy::IntentAction],
            LaunchTarget::Label(_) => &[LaunchStrategy::HomeSearch, LaunchStrategy::DrawerSearch],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStrategy {
    DirectStart,
    LaunchIntent,
    IntentAction,
    HomeSearch,
    DrawerSearch,
}

impl fmt::Display for LaunchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaunchStrategy::DirectStart => "direct_start",
            LaunchStrategy::LaunchIntent => "launch_intent",
            LaunchStrategy::IntentAction => "intent_action",
            LaunchStrategy::HomeSearch => "home_search",
            LaunchStrategy::DrawerSearch => "drawer_search",
        };
        f.write_str(name)
    }
}

pub struct AppLauncher {
    link: Arc<dyn DeviceLink>,
    aliases: AliasTable,
    config: LauncherConfig,
}

impl AppLauncher {
    pub fn new(link: Arc<dyn DeviceLink>, config: LauncherConfig) -> Self {
        let aliases = AliasTable::with_overrides(&config.aliases);
        Self {
            link,
            aliases,
            config,
        }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Alias table first; otherwise anything dotted is taken as a package id.
    pub fn resolve(&self, app_name: &str) -> LaunchTarget {
        let name = app_name.trim();
        match self.aliases.resolve(name) {
            Some(AliasTarget::Package(pkg)) => LaunchTarget::Package(pkg.clone()),
            Some(AliasTarget::Intent(action)) => LaunchTarget::Intent(action.clone()),
            None if name.contains('.') => LaunchTarget::Package(name.to_string()),
            None => LaunchTarget::Label(name.to_string()),
        }
    }

    pub async fn launch(&self, app_name: &str) -> MobileClawResult<LaunchOutcome> {
        let name = app_name.trim();
        if name.is_empty() {
            return Err(MobileClawError::MalformedOutput("open_app needs a non-empty app_name".into()));
        }

        let target = self.resolve(name);
        tracing::info!(app = %name, target = ?target, "launching app");

        let strategies = target.strategies();
        match first_success(strategies, |strategy| self.attempt(strategy, &target)).await {
            Ok((strategy, ())) => {
                let outcome = self.wait_front().await?;
                tracing::info!(app = %name, strategy = %strategy, foreground = %outcome, "app launched");
                Ok(outcome)
            }
            Err(attempts) => Err(MobileClawError::AppNotFound {
                name: name.to_string(),
                attempts: attempts.summary(),
            }),
        }
    }

    async fn attempt(&self, strategy: LaunchStrategy, target: &LaunchTarget) -> MobileClawResult<()> {
        let link = self.link.as_ref();
        match (strategy, target) {
            (LaunchStrategy::DirectStart, LaunchTarget::Package(pkg)) => link.open_app_native(pkg).await,
            (LaunchStrategy::LaunchIntent, LaunchTarget::Package(pkg)) => {
                let out = link
                    .shell(&format!("monkey -p {pkg} -c android.intent.category.LAUNCHER 1"))
                    .await?;
                check_shell(&out, "monkey")
            }
            (LaunchStrategy::IntentAction, LaunchTarget::Intent(action)) => {
                let out = link.shell(&format!("am start -a {action}")).await?;
                check_shell(&out, "am start")
            }
            (LaunchStrategy::HomeSearch, LaunchTarget::Label(label)) => {
                let search = LauncherSearch::new(link, &self.config);
                search.go_home().await?;
                search.search_and_open(label, &home_search_selectors()).await
            }
            (LaunchStrategy::DrawerSearch, LaunchTarget::Label(label)) => {
                let search = LauncherSearch::new(link, &self.config);
                search.open_drawer().await?;
                search.search_and_open(label, &drawer_search_selectors()).await
            }
            (strategy, target) => Err(MobileClawError::UnsupportedAction(format!(
                "{strategy} cannot launch {target:?}"
            ))),
        }
    }

    async fn wait_front(&self) -> MobileClawResult<ForegroundApp> {
        let excluded: HashSet<String> = self
            .config
            .launcher_packages
            .iter()
            .chain(self.config.assistant_packages.iter())
            .cloned()
            .collect();
        let config = StabilityConfig {
            max_wait_ms: self.config.timeout_ms,
            check_interval_ms: self.config.poll_interval_ms,
            min_stable_polls: 2,
            excluded_packages: excluded,
        };
        wait_for_foreground_stability(self.link.as_ref(), config).await
    }
}

/// `am` and `monkey` exit 0 on some failures, so the output is checked too.
fn check_shell(out: &ShellOutput, what: &str) -> MobileClawResult<()> {
    let stdout = out.stdout_text();
    let failed_text = ["Error:", "No activities found", "monkey aborted"]
        .iter()
        .any(|marker| stdout.contains(marker) || out.stderr.contains(marker));
    if out.success() && !failed_text {
        return Ok(());
    }
    let reason = if out.stderr.trim().is_empty() { stdout } else { out.stderr.trim().to_string() };
    Err(MobileClawError::DeviceTransient(format!(
        "{what} exited {}: {reason}",
        out.code
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::{DeviceCall, FakeDevice};
    use crate::device::UiNode;
    use crate::launcher::aliases::AliasSpec;

    fn launcher_with(link: Arc<FakeDevice>, config: LauncherConfig) -> AppLauncher {
        AppLauncher::new(link, config)
    }

    fn app(pkg: &str, activity: &str) -> ForegroundApp {
        ForegroundApp::new(pkg, activity)
    }

    fn is_search_call(call: &DeviceCall) -> bool {
        match call {
            DeviceCall::FindNode(_) | DeviceCall::TypeText(_) => true,
            DeviceCall::Shell(cmd) => cmd.contains("category.HOME"),
            _ => false,
        }
    }

    #[test]
    fn resolution_prefers_aliases_then_dots() {
        let launcher = launcher_with(Arc::new(FakeDevice::new()), LauncherConfig::default());
        assert_eq!(launcher.resolve(" Chrome "), LaunchTarget::Package("com.android.chrome".into()));
        assert_eq!(launcher.resolve("WiFi"), LaunchTarget::Intent("android.settings.WIFI_SETTINGS".into()));
        assert_eq!(launcher.resolve("com.x.y"), LaunchTarget::Package("com.x.y".into()));
        assert_eq!(launcher.resolve("WhatsApp"), LaunchTarget::Label("WhatsApp".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn intent_alias_launches_without_search() {
        let settings = app("com.android.settings", ".Settings");
        let link = Arc::new(FakeDevice::new().with_intent("android.settings.SETTINGS", settings.clone()));
        let launcher = launcher_with(link.clone(), LauncherConfig::default());

        let outcome = launcher.launch("设置").await.unwrap();
        assert_eq!(outcome, settings);
        let calls = link.calls();
        assert!(calls.contains(&DeviceCall::Shell("am start -a android.settings.SETTINGS".into())));
        assert!(!calls.iter().any(is_search_call));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_intent_never_falls_back_to_search() {
        let link = Arc::new(FakeDevice::new());
        let launcher = launcher_with(link.clone(), LauncherConfig::default());
        let err = launcher.launch("bluetooth").await.unwrap_err();
        match err {
            MobileClawError::AppNotFound { name, attempts } => {
                assert_eq!(name, "bluetooth");
                assert!(attempts.starts_with("intent_action:"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!link.calls().iter().any(is_search_call));
    }

    #[tokio::test(start_paused = true)]
    async fn package_falls_back_to_monkey() {
        let link = Arc::new(
            FakeDevice::new().with_shell_response(
                "monkey -p com.example.notes",
                ShellOutput::default(),
            ),
        );
        let mut config = LauncherConfig::default();
        config.aliases.insert("notes".into(), AliasSpec::Plain("com.example.notes".into()));
        let launcher = launcher_with(link.clone(), config);

        // Native start fails (not "installed"), monkey reports success; the
        // foreground never settles so the current (empty) app comes back.
        let outcome = launcher.launch("Notes").await.unwrap();
        assert_eq!(outcome, ForegroundApp::default());
        let mutations = link.mutations();
        assert_eq!(mutations[0], DeviceCall::OpenAppNative("com.example.notes".into()));
        assert_eq!(
            mutations[1],
            DeviceCall::Shell("monkey -p com.example.notes -c android.intent.category.LAUNCHER 1".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn installed_package_starts_directly() {
        let link = Arc::new(FakeDevice::new().with_installed("com.android.chrome"));
        let launcher = launcher_with(link.clone(), LauncherConfig::default());
        let outcome = launcher.launch("chrome").await.unwrap();
        assert_eq!(outcome, app("com.android.chrome", ".MainActivity"));
        assert_eq!(link.mutations(), vec![DeviceCall::OpenAppNative("com.android.chrome".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_label_is_found_through_home_search() {
        let whatsapp = app("com.whatsapp", ".Main");
        let link = Arc::new(
            FakeDevice::new()
                .with_foreground(app("com.google.android.apps.nexuslauncher", ".Home"))
                .with_node(UiNode {
                    class_name: "android.widget.EditText".into(),
                    bounds: (0, 100, 1080, 200),
                    ..Default::default()
                })
                .with_node(UiNode {
                    text: "WhatsApp".into(),
                    bounds: (0, 400, 200, 500),
                    ..Default::default()
                })
                .with_node_launch("WhatsApp", whatsapp.clone()),
        );
        let config = LauncherConfig {
            launcher_packages: vec!["com.google.android.apps.nexuslauncher".into()],
            ..Default::default()
        };
        let launcher = launcher_with(link.clone(), config);
        assert_eq!(launcher.launch("WhatsApp").await.unwrap(), whatsapp);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_search_reports_both_strategies() {
        let link = Arc::new(FakeDevice::new());
        let launcher = launcher_with(link, LauncherConfig::default());
        match launcher.launch("Nowhere").await.unwrap_err() {
            MobileClawError::AppNotFound { attempts, .. } => {
                assert!(attempts.contains("home_search:"));
                assert!(attempts.contains("drawer_search:"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let launcher = launcher_with(Arc::new(FakeDevice::new()), LauncherConfig::default());
        assert!(matches!(
            launcher.launch("   ").await.unwrap_err(),
            MobileClawError::MalformedOutput(_)
        ));
    }

    #[test]
    fn shell_output_markers_count_as_failure() {
        let aborted = ShellOutput {
            code: 0,
            stdout: b"** No activities found to run, monkey aborted.".to_vec(),
            stderr: String::new(),
        };
        assert!(check_shell(&aborted, "monkey").is_err());
        assert!(check_shell(&ShellOutput::default(), "monkey").is_ok());
    }
}
