//! In-memory [`DeviceLink`] for deterministic tests and offline demos.
//!
//! Responses are scripted up front through the `with_*` builders; every call is
//! recorded and can be inspected with [`FakeDevice::calls`].
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::device::{DeviceLink, ForegroundApp, ShellOutput, TypeOutcome, UiNode, UiSelector};
use crate::errors::{MobileClawError, MobileClawResult};

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Click { x: i32, y: i32 },
    LongPress { x: i32, y: i32, duration: f64 },
    Drag { sx: i32, sy: i32, ex: i32, ey: i32, duration: f64 },
    Swipe { sx: i32, sy: i32, ex: i32, ey: i32, duration: f64 },
    TypeText(String),
    PressHome,
    PressBack,
    OpenAppNative(String),
    Screenshot,
    ForegroundApp,
    Shell(String),
    WindowSize,
    FindNode(String),
    HealthCheck,
    Reconnect,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<DeviceCall>,
    window_size: Option<(u32, u32)>,
    screenshot: Option<Vec<u8>>,
    screenshot_failures: u32,
    health_check: Option<bool>,
    foreground: Option<ForegroundApp>,
    foreground_script: VecDeque<Option<ForegroundApp>>,
    installed: HashSet<String>,
    intents: HashMap<String, ForegroundApp>,
    nodes: Vec<UiNode>,
    node_launches: HashMap<String, ForegroundApp>,
    shell_responses: HashMap<String, VecDeque<ShellOutput>>,
    type_outcome: Option<TypeOutcome>,
    failing_gestures: bool,
}

pub struct FakeDevice {
    state: Mutex<FakeState>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                window_size: Some((1080, 1920)),
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut FakeState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.state_mut().window_size = Some((width, height));
        self
    }

    /// Makes `window_size` fail so callers exercise their fallback size.
    pub fn without_window_size(mut self) -> Self {
        self.state_mut().window_size = None;
        self
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.state_mut().screenshot = Some(png);
        self
    }

    /// The next `count` primary captures fail.
    pub fn fail_screenshots(mut self, count: u32) -> Self {
        self.state_mut().screenshot_failures = count;
        self
    }

    pub fn with_health_check(mut self, healthy: bool) -> Self {
        self.state_mut().health_check = Some(healthy);
        self
    }

    pub fn with_foreground(mut self, app: ForegroundApp) -> Self {
        self.state_mut().foreground = Some(app);
        self
    }

    /// Foreground answers handed out one per poll before falling back to the
    /// current app.
    pub fn script_foreground(mut self, script: Vec<Option<ForegroundApp>>) -> Self {
        self.state_mut().foreground_script.extend(script);
        self
    }

    pub fn with_installed(mut self, package: &str) -> Self {
        self.state_mut().installed.insert(package.to_string());
        self
    }

    /// `am start -a <action>` brings `app` to the front.
    pub fn with_intent(mut self, action: &str, app: ForegroundApp) -> Self {
        self.state_mut().intents.insert(action.to_string(), app);
        self
    }

    pub fn with_node(mut self, node: UiNode) -> Self {
        self.state_mut().nodes.push(node);
        self
    }

    /// Clicking a node with this exact text launches `app`.
    pub fn with_node_launch(mut self, text: &str, app: ForegroundApp) -> Self {
        self.state_mut().node_launches.insert(text.to_string(), app);
        self
    }

    /// Queues a response for shell commands starting with `prefix`.
    pub fn with_shell_response(mut self, prefix: &str, output: ShellOutput) -> Self {
        self.state_mut()
            .shell_responses
            .entry(prefix.to_string())
            .or_default()
            .push_back(output);
        self
    }

    pub fn with_type_outcome(mut self, outcome: TypeOutcome) -> Self {
        self.state_mut().type_outcome = Some(outcome);
        self
    }

    /// Touch gestures raise a transient error.
    pub fn with_failing_gestures(mut self) -> Self {
        self.state_mut().failing_gestures = true;
        self
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state().calls.clone()
    }

    /// Calls that changed device state; queries are filtered out.
    pub fn mutations(&self) -> Vec<DeviceCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                !matches!(
                    c,
                    DeviceCall::Screenshot
                        | DeviceCall::ForegroundApp
                        | DeviceCall::WindowSize
                        | DeviceCall::FindNode(_)
                        | DeviceCall::HealthCheck
                )
            })
            .collect()
    }

    fn log(&self, call: DeviceCall) {
        self.state().calls.push(call);
    }

    fn record(&self, call: DeviceCall) -> MutexGuard<'_, FakeState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }

    fn gesture(&self, call: DeviceCall) -> MobileClawResult<()> {
        let state = self.record(call);
        if state.failing_gestures {
            return Err(MobileClawError::DeviceTransient("gesture rejected".into()));
        }
        Ok(())
    }
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceLink for FakeDevice {
    async fn click(&self, x: i32, y: i32) -> MobileClawResult<()> {
        self.gesture(DeviceCall::Click { x, y })?;
        let mut state = self.state();
        let hit = state
            .nodes
            .iter()
            .find(|n| {
                let (l, t, r, b) = n.bounds;
                x >= l && x <= r && y >= t && y <= b
            })
            .and_then(|n| state.node_launches.get(&n.text).cloned());
        if let Some(app) = hit {
            state.foreground = Some(app);
        }
        Ok(())
    }

    async fn long_press(&self, x: i32, y: i32, duration: f64) -> MobileClawResult<()> {
        self.gesture(DeviceCall::LongPress { x, y, duration })
    }

    async fn drag(&self, sx: i32, sy: i32, ex: i32, ey: i32, duration: f64) -> MobileClawResult<()> {
        self.gesture(DeviceCall::Drag { sx, sy, ex, ey, duration })
    }

    async fn swipe(&self, sx: i32, sy: i32, ex: i32, ey: i32, duration: f64) -> MobileClawResult<()> {
        self.gesture(DeviceCall::Swipe { sx, sy, ex, ey, duration })
    }

    async fn type_text(&self, content: &str) -> MobileClawResult<TypeOutcome> {
        let state = self.record(DeviceCall::TypeText(content.to_string()));
        Ok(state
            .type_outcome
            .clone()
            .unwrap_or_else(|| TypeOutcome::success("fake")))
    }

    async fn press_home(&self) -> MobileClawResult<()> {
        self.log(DeviceCall::PressHome);
        Ok(())
    }

    async fn press_back(&self) -> MobileClawResult<()> {
        self.log(DeviceCall::PressBack);
        Ok(())
    }

    async fn open_app_native(&self, package: &str) -> MobileClawResult<()> {
        let mut state = self.record(DeviceCall::OpenAppNative(package.to_string()));
        if !state.installed.contains(package) {
            return Err(MobileClawError::DeviceTransient(format!(
                "package {package} not installed"
            )));
        }
        state.foreground = Some(ForegroundApp::new(package, ".MainActivity"));
        Ok(())
    }

    async fn screenshot(&self) -> MobileClawResult<Vec<u8>> {
        let mut state = self.record(DeviceCall::Screenshot);
        if state.screenshot_failures > 0 {
            state.screenshot_failures -= 1;
            return Err(MobileClawError::DeviceTransient("capture service died".into()));
        }
        state
            .screenshot
            .clone()
            .ok_or_else(|| MobileClawError::DeviceTransient("no screen scripted".into()))
    }

    async fn foreground_app(&self) -> MobileClawResult<Option<ForegroundApp>> {
        let mut state = self.record(DeviceCall::ForegroundApp);
        if let Some(next) = state.foreground_script.pop_front() {
            return Ok(next);
        }
        Ok(state.foreground.clone())
    }

    async fn shell(&self, cmd: &str) -> MobileClawResult<ShellOutput> {
        let mut state = self.record(DeviceCall::Shell(cmd.to_string()));

        let scripted = state
            .shell_responses
            .iter_mut()
            .find(|(prefix, queue)| cmd.starts_with(prefix.as_str()) && !queue.is_empty())
            .and_then(|(_, queue)| queue.pop_front());
        if let Some(output) = scripted {
            return Ok(output);
        }

        if let Some(action) = cmd.strip_prefix("am start -a ") {
            let action = action.split_whitespace().next().unwrap_or_default();
            if let Some(app) = state.intents.get(action).cloned() {
                state.foreground = Some(app);
                return Ok(ShellOutput::default());
            }
            if action == "android.intent.action.MAIN" {
                return Ok(ShellOutput::default());
            }
            return Ok(ShellOutput {
                code: 1,
                stdout: Vec::new(),
                stderr: format!("Error: Activity not started, unable to resolve {action}"),
            });
        }

        if let Some(rest) = cmd.strip_prefix("monkey -p ") {
            let package = rest.split_whitespace().next().unwrap_or_default().to_string();
            if state.installed.contains(&package) {
                state.foreground = Some(ForegroundApp::new(&package, ".MainActivity"));
                return Ok(ShellOutput::default());
            }
            return Ok(ShellOutput {
                code: 252,
                stdout: b"** No activities found to run, monkey aborted.".to_vec(),
                stderr: String::new(),
            });
        }

        Ok(ShellOutput::default())
    }

    async fn window_size(&self) -> MobileClawResult<(u32, u32)> {
        let state = self.record(DeviceCall::WindowSize);
        state
            .window_size
            .ok_or_else(|| MobileClawError::DeviceTransient("window size unavailable".into()))
    }

    async fn find_nodes(&self, selector: &UiSelector) -> MobileClawResult<Vec<UiNode>> {
        let state = self.record(DeviceCall::FindNode(selector.to_string()));
        Ok(state.nodes.iter().filter(|n| selector.matches(n)).cloned().collect())
    }

    async fn health_check(&self) -> MobileClawResult<bool> {
        let state = self.record(DeviceCall::HealthCheck);
        Ok(state.health_check.unwrap_or(false))
    }

    async fn reconnect(&self) -> MobileClawResult<()> {
        self.log(DeviceCall::Reconnect);
        Ok(())
    }
}
