//! Launcher-search fallback: type the app label into the home screen (or app
//! drawer) search box and tap the matching result.
use std::time::Duration;

use crate::config::LauncherConfig;
use crate::device::{DeviceLink, UiNode, UiSelector};
use crate::errors::{MobileClawError, MobileClawResult};

const HOME_INTENT: &str = "am start -a android.intent.action.MAIN -c android.intent.category.HOME";
const KEYCODE_ENTER: &str = "input keyevent 66";

/// Only real editable boxes. Tapping a search *entry point* opens the assistant.
pub fn home_search_selectors() -> Vec<UiSelector> {
    vec![
        UiSelector::ResourceId("com.google.android.apps.nexuslauncher:id/search_box_input".into()),
        UiSelector::ResourceId("com.google.android.apps.nexuslauncher:id/search_box_text".into()),
        UiSelector::ClassName("android.widget.EditText".into()),
    ]
}

pub fn drawer_search_selectors() -> Vec<UiSelector> {
    vec![
        UiSelector::ResourceId("com.google.android.apps.nexuslauncher:id/apps_list_search_box".into()),
        UiSelector::ClassName("android.widget.EditText".into()),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorOutcome {
    Opened,
    /// Box absent or not typeable; move on to the next selector.
    Unusable,
    NoResult,
    /// The assistant took the foreground and was dismissed.
    Hijacked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Opened,
    Exhausted,
    Hijacked,
}

pub struct LauncherSearch<'a> {
    link: &'a dyn DeviceLink,
    config: &'a LauncherConfig,
}

impl<'a> LauncherSearch<'a> {
    pub fn new(link: &'a dyn DeviceLink, config: &'a LauncherConfig) -> Self {
        Self { link, config }
    }

    /// HOME intent first, then a single Home press. Pressing Home twice can
    /// trigger the assistant gesture.
    pub async fn go_home(&self) -> MobileClawResult<()> {
        if let Err(e) = self.link.shell(HOME_INTENT).await {
            tracing::debug!(error = %e, "home intent failed");
        }
        sleep_ms(200).await;
        if let Err(e) = self.link.press_home().await {
            tracing::debug!(error = %e, "home press failed");
        }
        sleep_ms(200).await;
        self.clear_assistant().await
    }

    /// Swipes up from the bottom edge to reveal the app drawer.
    pub async fn open_drawer(&self) -> MobileClawResult<()> {
        match self.link.window_size().await {
            Ok((w, h)) => {
                let x = (w as f64 * 0.5).round() as i32;
                let from_y = (h as f64 * 0.95).round() as i32;
                let to_y = (h as f64 * 0.10).round() as i32;
                if let Err(e) = self.link.swipe(x, from_y, x, to_y, 0.30).await {
                    tracing::debug!(error = %e, "drawer swipe failed");
                }
            }
            Err(e) => tracing::debug!(error = %e, "window size unavailable, drawer not opened"),
        }
        sleep_ms(300).await;
        self.clear_assistant().await
    }

    /// Dismisses the assistant up to `guard_retries + 1` times; fails if it
    /// still holds the foreground afterwards.
    async fn clear_assistant(&self) -> MobileClawResult<()> {
        for _ in 0..=self.config.guard_retries {
            if !self.guard_assistant().await {
                return Ok(());
            }
        }
        match self.assistant_in_front().await {
            Some(package) => Err(MobileClawError::DeviceTransient(format!(
                "assistant {package} kept the foreground"
            ))),
            None => Ok(()),
        }
    }

    async fn assistant_in_front(&self) -> Option<String> {
        let package = match self.link.foreground_app().await {
            Ok(Some(app)) => app.package,
            _ => return None,
        };
        self.config
            .assistant_packages
            .iter()
            .any(|p| *p == package)
            .then_some(package)
    }

    /// Presses Back once if an assistant package holds the foreground.
    /// Returns `true` when it had to.
    pub async fn guard_assistant(&self) -> bool {
        let Some(package) = self.assistant_in_front().await else {
            return false;
        };

        tracing::warn!(package = %package, "assistant hijacked the foreground, pressing back");
        if let Err(e) = self.link.press_back().await {
            tracing::debug!(error = %e, "back press failed while dismissing assistant");
        }
        sleep_ms(200).await;
        true
    }

    /// Tries each selector in order until a result for `label` is tapped.
    pub async fn search_and_open(&self, label: &str, selectors: &[UiSelector]) -> MobileClawResult<()> {
        for selector in selectors {
            let mut retries = 0;
            loop {
                match self.try_selector(label, selector).await? {
                    SelectorOutcome::Opened => {
                        tracing::info!(label = %label, selector = %selector, "launcher search hit");
                        return Ok(());
                    }
                    SelectorOutcome::Hijacked if retries < self.config.guard_retries => {
                        retries += 1;
                        tracing::info!(selector = %selector, retry = retries, "retrying after assistant");
                    }
                    SelectorOutcome::Hijacked | SelectorOutcome::Unusable | SelectorOutcome::NoResult => {
                        break
                    }
                }
            }
        }
        Err(MobileClawError::DeviceTransient(format!(
            "launcher search found nothing for '{label}'"
        )))
    }

    async fn try_selector(&self, label: &str, selector: &UiSelector) -> MobileClawResult<SelectorOutcome> {
        let Some(box_node) = self.link.find_node(selector).await? else {
            return Ok(SelectorOutcome::Unusable);
        };

        let (x, y) = box_node.center();
        self.link.click(x, y).await?;
        sleep_ms(100).await;
        if self.guard_assistant().await {
            return Ok(SelectorOutcome::Hijacked);
        }

        // No trailing newline: submitting can route the query to web search.
        let typed = self.link.type_text(label).await?;
        if self.guard_assistant().await {
            return Ok(SelectorOutcome::Hijacked);
        }
        if !typed.ok {
            tracing::debug!(selector = %selector, error = ?typed.error, "search box not typeable");
            return Ok(SelectorOutcome::Unusable);
        }

        match self.poll_results(label, &box_node, self.config.search_polls).await? {
            PollOutcome::Opened => return Ok(SelectorOutcome::Opened),
            PollOutcome::Hijacked => return Ok(SelectorOutcome::Hijacked),
            PollOutcome::Exhausted => {}
        }

        self.link.shell(KEYCODE_ENTER).await?;
        sleep_ms(250).await;
        if self.guard_assistant().await {
            return Ok(SelectorOutcome::Hijacked);
        }

        Ok(match self.poll_results(label, &box_node, self.config.enter_polls).await? {
            PollOutcome::Opened => SelectorOutcome::Opened,
            PollOutcome::Hijacked => SelectorOutcome::Hijacked,
            PollOutcome::Exhausted => SelectorOutcome::NoResult,
        })
    }

    /// Exact label first, then any text containing it. The box that holds the
    /// typed query and other text fields are never results.
    async fn poll_results(
        &self,
        label: &str,
        search_box: &UiNode,
        polls: u32,
    ) -> MobileClawResult<PollOutcome> {
        let candidates = [UiSelector::text_exact(label), UiSelector::text_contains(label)];
        for _ in 0..polls {
            for selector in &candidates {
                let hit = self
                    .link
                    .find_nodes(selector)
                    .await?
                    .into_iter()
                    .find(|n| n != search_box && !n.is_text_field());
                if let Some(node) = hit {
                    let (x, y) = node.center();
                    self.link.click(x, y).await?;
                    return Ok(PollOutcome::Opened);
                }
            }
            sleep_ms(self.config.poll_interval_ms).await;
            if self.guard_assistant().await {
                return Ok(PollOutcome::Hijacked);
            }
        }
        Ok(PollOutcome::Exhausted)
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::{DeviceCall, FakeDevice};
    use crate::device::ForegroundApp;

    fn node(text: &str, class: &str, bounds: (i32, i32, i32, i32)) -> UiNode {
        UiNode {
            text: text.into(),
            class_name: class.into(),
            bounds,
            ..Default::default()
        }
    }

    fn search_box() -> UiNode {
        node("", "android.widget.EditText", (0, 100, 1080, 200))
    }

    #[tokio::test(start_paused = true)]
    async fn exact_result_is_tapped() {
        let link = FakeDevice::new()
            .with_node(search_box())
            .with_node(node("WhatsApp", "android.widget.TextView", (0, 400, 200, 500)));
        let config = LauncherConfig::default();
        let search = LauncherSearch::new(&link, &config);
        search
            .search_and_open("whatsapp", &home_search_selectors())
            .await
            .unwrap();
        let mutations = link.mutations();
        assert!(mutations.contains(&DeviceCall::TypeText("whatsapp".into())));
        assert_eq!(mutations.last(), Some(&DeviceCall::Click { x: 100, y: 450 }));
    }

    #[tokio::test(start_paused = true)]
    async fn enter_is_pressed_after_empty_polls() {
        let link = FakeDevice::new().with_node(search_box());
        let config = LauncherConfig::default();
        let search = LauncherSearch::new(&link, &config);
        assert!(search.search_and_open("nothing", &home_search_selectors()).await.is_err());
        assert!(link.calls().contains(&DeviceCall::Shell(KEYCODE_ENTER.into())));
    }

    #[tokio::test(start_paused = true)]
    async fn assistant_is_dismissed_and_step_retried() {
        let assistant = ForegroundApp::new("com.google.android.googlequicksearchbox", ".Main");
        let launcher = ForegroundApp::new("com.google.android.apps.nexuslauncher", ".Home");
        let link = FakeDevice::new()
            .with_foreground(launcher)
            .script_foreground(vec![Some(assistant)])
            .with_node(search_box())
            .with_node(node("Notes", "android.widget.TextView", (0, 400, 200, 500)));
        let config = LauncherConfig::default();
        let search = LauncherSearch::new(&link, &config);
        search
            .search_and_open("Notes", &home_search_selectors())
            .await
            .unwrap();

        let mutations = link.mutations();
        let back = mutations.iter().position(|c| *c == DeviceCall::PressBack).unwrap();
        let typed = mutations
            .iter()
            .position(|c| *c == DeviceCall::TypeText("Notes".into()))
            .unwrap();
        assert!(back < typed);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_box_fails_without_typing() {
        let link = FakeDevice::new();
        let config = LauncherConfig::default();
        let search = LauncherSearch::new(&link, &config);
        assert!(search.search_and_open("x", &drawer_search_selectors()).await.is_err());
        assert!(link.mutations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn filled_search_box_is_not_taken_for_a_result() {
        let link = FakeDevice::new()
            .with_node(node("Notes", "android.widget.EditText", (0, 100, 1080, 200)))
            .with_node(node("Notes", "android.widget.TextView", (0, 400, 200, 500)));
        let config = LauncherConfig::default();
        let search = LauncherSearch::new(&link, &config);
        search
            .search_and_open("Notes", &home_search_selectors())
            .await
            .unwrap();
        let clicks: Vec<_> = link
            .mutations()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::Click { .. }))
            .collect();
        assert_eq!(
            clicks,
            vec![DeviceCall::Click { x: 540, y: 150 }, DeviceCall::Click { x: 100, y: 450 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn assistant_after_home_is_dismissed_before_any_tap() {
        let assistant = ForegroundApp::new("com.google.android.googlequicksearchbox", ".Main");
        let launcher = ForegroundApp::new("com.google.android.apps.nexuslauncher", ".Home");
        let link = FakeDevice::new()
            .with_foreground(launcher)
            .script_foreground(vec![Some(assistant)])
            .with_node(search_box())
            .with_node(node("Notes", "android.widget.TextView", (0, 400, 200, 500)));
        let config = LauncherConfig::default();
        let search = LauncherSearch::new(&link, &config);
        search.go_home().await.unwrap();

        let calls = link.calls();
        let first_check = calls.iter().position(|c| *c == DeviceCall::ForegroundApp).unwrap();
        let back = calls.iter().position(|c| *c == DeviceCall::PressBack).unwrap();
        assert!(first_check < back);
        assert!(!calls.iter().any(|c| matches!(c, DeviceCall::Click { .. })));

        search
            .search_and_open("Notes", &home_search_selectors())
            .await
            .unwrap();
        let calls = link.calls();
        let first_click = calls
            .iter()
            .position(|c| matches!(c, DeviceCall::Click { .. }))
            .unwrap();
        assert!(back < first_click);
    }

    #[tokio::test(start_paused = true)]
    async fn drawer_fails_when_assistant_will_not_leave() {
        let assistant = ForegroundApp::new("com.google.android.googlequicksearchbox", ".Main");
        let link = FakeDevice::new().with_foreground(assistant);
        let config = LauncherConfig::default();
        let search = LauncherSearch::new(&link, &config);
        assert!(search.open_drawer().await.is_err());
        let backs = link.calls().iter().filter(|c| **c == DeviceCall::PressBack).count();
        assert_eq!(backs as u32, config.guard_retries + 1);
    }
}
