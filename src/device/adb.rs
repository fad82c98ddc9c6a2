//! `DeviceLink` over the adb command-line bridge.
//!
//! Every call spawns `adb` through `tokio::process` under a per-call timeout, so a
//! wedged transport surfaces as `DeviceTransient` instead of hanging the step.
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::config::DeviceConfig;
use crate::device::{DeviceLink, ForegroundApp, ShellOutput, TypeOutcome, UiNode, UiSelector};
use crate::errors::{MobileClawError, MobileClawResult};

/// Where `uiautomator dump` writes the hierarchy on the device.
const DUMP_PATH: &str = "/sdcard/mobileclaw_ui.xml";
const KEYCODE_HOME: u32 = 3;
const KEYCODE_BACK: u32 = 4;
const KEYCODE_ENTER: u32 = 66;

fn focus_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"mCurrentFocus=Window\{[^}]*?\s([\w.]+)/([\w.$]+)\}")
            .expect("focus regex must compile")
    })
}

fn focused_app_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"mFocusedApp=.*?\s([\w.]+)/([\w.$]+)").expect("focused app regex must compile")
    })
}

fn wm_size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(Physical|Override) size:\s*(\d+)x(\d+)").expect("wm size regex must compile")
    })
}

fn node_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<node\b[^>]*>").expect("node regex must compile"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([\w:-]+)="([^"]*)""#).expect("attr regex must compile"))
}

fn bounds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").expect("bounds regex must compile")
    })
}

pub struct AdbDevice {
    adb_path: String,
    serial: Option<String>,
    timeout: Duration,
}

impl AdbDevice {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            adb_path: config.adb_path.clone(),
            serial: config.serial.clone(),
            timeout: Duration::from_millis(config.command_timeout_ms),
        }
    }

    /// Runs `adb [-s serial] <args>` and returns the raw process output.
    async fn adb(&self, args: &[&str]) -> MobileClawResult<ShellOutput> {
        let mut cmd = tokio::process::Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            cmd.args(["-s", serial.as_str()]);
        }
        cmd.args(args).kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, cmd.output()).await;
        match result {
            Ok(Ok(output)) => Ok(ShellOutput {
                code: output.status.code().unwrap_or(-1),
                stdout: output.stdout,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Ok(Err(e)) => Err(MobileClawError::DeviceTransient(format!(
                "failed to execute {}: {e}",
                self.adb_path
            ))),
            Err(_) => Err(MobileClawError::DeviceTransient(format!(
                "adb {} timed out after {}ms",
                args.join(" "),
                self.timeout.as_millis()
            ))),
        }
    }

    /// Runs a shell command that must succeed; non-zero exit is a transient fault.
    async fn shell_ok(&self, cmd: &str) -> MobileClawResult<ShellOutput> {
        let output = self.shell(cmd).await?;
        if !output.success() {
            return Err(MobileClawError::DeviceTransient(format!(
                "`{cmd}` exited with {}: {}",
                output.code, output.stderr
            )));
        }
        Ok(output)
    }

    async fn keyevent(&self, code: u32) -> MobileClawResult<()> {
        self.shell_ok(&format!("input keyevent {code}")).await.map(|_| ())
    }

    async fn dump_hierarchy(&self) -> MobileClawResult<Vec<UiNode>> {
        self.shell_ok(&format!("uiautomator dump {DUMP_PATH}")).await?;
        let xml = self.shell_ok(&format!("cat {DUMP_PATH}")).await?;
        Ok(parse_hierarchy(&String::from_utf8_lossy(&xml.stdout)))
    }

    /// Plain `input text`, one line at a time with ENTER between lines.
    async fn type_with_input(&self, content: &str) -> MobileClawResult<()> {
        let normalized = content.replace("\r\n", "\n");
        let lines: Vec<&str> = normalized.split('\n').collect();
        for (i, line) in lines.iter().enumerate() {
            if !line.is_empty() {
                let escaped = line.replace(' ', "%s");
                self.shell_ok(&format!("input text {}", shell_quote(&escaped)))
                    .await?;
            }
            if i + 1 < lines.len() {
                self.keyevent(KEYCODE_ENTER).await?;
            }
        }
        Ok(())
    }

    /// ADBKeyboard broadcast; the only adb path that handles non-ASCII text.
    async fn type_with_broadcast(&self, content: &str) -> MobileClawResult<()> {
        let (body, submit) = match content.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (content, false),
        };
        if !body.is_empty() {
            let output = self
                .shell_ok(&format!(
                    "am broadcast -a ADB_INPUT_TEXT --es msg {}",
                    shell_quote(body)
                ))
                .await?;
            if !output.stdout_text().contains("result=0") {
                return Err(MobileClawError::DeviceTransient(
                    "ADBKeyboard did not accept the broadcast".into(),
                ));
            }
        }
        if submit {
            self.keyevent(KEYCODE_ENTER).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceLink for AdbDevice {
    async fn click(&self, x: i32, y: i32) -> MobileClawResult<()> {
        self.shell_ok(&format!("input tap {x} {y}")).await.map(|_| ())
    }

    async fn long_press(&self, x: i32, y: i32, duration: f64) -> MobileClawResult<()> {
        let ms = seconds_to_ms(duration);
        self.shell_ok(&format!("input swipe {x} {y} {x} {y} {ms}"))
            .await
            .map(|_| ())
    }

    async fn drag(&self, sx: i32, sy: i32, ex: i32, ey: i32, duration: f64) -> MobileClawResult<()> {
        let ms = seconds_to_ms(duration);
        self.shell_ok(&format!("input draganddrop {sx} {sy} {ex} {ey} {ms}"))
            .await
            .map(|_| ())
    }

    async fn swipe(&self, sx: i32, sy: i32, ex: i32, ey: i32, duration: f64) -> MobileClawResult<()> {
        let ms = seconds_to_ms(duration);
        self.shell_ok(&format!("input swipe {sx} {sy} {ex} {ey} {ms}"))
            .await
            .map(|_| ())
    }

    async fn type_text(&self, content: &str) -> MobileClawResult<TypeOutcome> {
        if content.is_ascii() {
            match self.type_with_input(content).await {
                Ok(()) => return Ok(TypeOutcome::success("input_text")),
                Err(e) => tracing::warn!(error = %e, "input text failed, trying ADBKeyboard"),
            }
        }
        match self.type_with_broadcast(content).await {
            Ok(()) => Ok(TypeOutcome::success("adb_keyboard")),
            Err(e) => Ok(TypeOutcome::failure(e.to_string())),
        }
    }

    async fn press_home(&self) -> MobileClawResult<()> {
        self.keyevent(KEYCODE_HOME).await
    }

    async fn press_back(&self) -> MobileClawResult<()> {
        self.keyevent(KEYCODE_BACK).await
    }

    async fn open_app_native(&self, package: &str) -> MobileClawResult<()> {
        let resolved = self
            .shell_ok(&format!(
                "cmd package resolve-activity --brief -c android.intent.category.LAUNCHER {package}"
            ))
            .await?;
        let text = resolved.stdout_text();
        let component = text
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| l.contains('/'))
            .ok_or_else(|| {
                MobileClawError::DeviceTransient(format!("no launcher activity for {package}"))
            })?;
        self.shell_ok(&format!("am start -n {component}")).await.map(|_| ())
    }

    async fn screenshot(&self) -> MobileClawResult<Vec<u8>> {
        let output = self.adb(&["exec-out", "screencap", "-p"]).await?;
        if !output.success() || output.stdout.is_empty() {
            return Err(MobileClawError::DeviceTransient(format!(
                "exec-out screencap failed ({}): {}",
                output.code, output.stderr
            )));
        }
        Ok(output.stdout)
    }

    async fn foreground_app(&self) -> MobileClawResult<Option<ForegroundApp>> {
        let output = self.shell_ok("dumpsys window").await?;
        Ok(parse_foreground(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn shell(&self, cmd: &str) -> MobileClawResult<ShellOutput> {
        self.adb(&["shell", cmd]).await
    }

    async fn window_size(&self) -> MobileClawResult<(u32, u32)> {
        let output = self.shell_ok("wm size").await?;
        parse_wm_size(&output.stdout_text()).ok_or_else(|| {
            MobileClawError::DeviceTransient(format!(
                "unrecognized `wm size` output: {}",
                output.stdout_text()
            ))
        })
    }

    async fn find_nodes(&self, selector: &UiSelector) -> MobileClawResult<Vec<UiNode>> {
        let nodes = self.dump_hierarchy().await?;
        Ok(nodes.into_iter().filter(|n| selector.matches(n)).collect())
    }

    async fn health_check(&self) -> MobileClawResult<bool> {
        let output = self.adb(&["get-state"]).await?;
        Ok(output.success() && output.stdout_text() == "device")
    }

    async fn reconnect(&self) -> MobileClawResult<()> {
        tracing::info!(serial = ?self.serial, "restarting adb server");
        let mut start = tokio::process::Command::new(&self.adb_path);
        start.arg("start-server").kill_on_drop(true);
        match tokio::time::timeout(self.timeout, start.output()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(MobileClawError::DeviceTransient(format!(
                    "adb start-server failed: {e}"
                )))
            }
            Err(_) => {
                return Err(MobileClawError::DeviceTransient(
                    "adb start-server timed out".into(),
                ))
            }
        }
        self.adb(&["wait-for-device"]).await.map(|_| ())
    }
}

fn seconds_to_ms(duration: f64) -> u64 {
    (duration.max(0.0) * 1000.0).round() as u64
}

/// Single-quotes `s` for the device shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn parse_foreground(dumpsys: &str) -> Option<ForegroundApp> {
    focus_re()
        .captures(dumpsys)
        .or_else(|| focused_app_re().captures(dumpsys))
        .map(|caps| ForegroundApp::new(&caps[1], &caps[2]))
}

/// An override size (set by `wm size WxH`) wins over the physical panel size.
fn parse_wm_size(text: &str) -> Option<(u32, u32)> {
    let mut physical = None;
    let mut overridden = None;
    for caps in wm_size_re().captures_iter(text) {
        let w: u32 = caps[2].parse().ok()?;
        let h: u32 = caps[3].parse().ok()?;
        match &caps[1] {
            "Override" => overridden = Some((w, h)),
            _ => physical = Some((w, h)),
        }
    }
    overridden.or(physical)
}

fn parse_hierarchy(xml: &str) -> Vec<UiNode> {
    node_re()
        .find_iter(xml)
        .filter_map(|m| {
            let mut node = UiNode::default();
            let mut has_bounds = false;
            for caps in attr_re().captures_iter(m.as_str()) {
                let value = decode_entities(&caps[2]);
                match &caps[1] {
                    "text" => node.text = value,
                    "resource-id" => node.resource_id = value,
                    "class" => node.class_name = value,
                    "bounds" => {
                        if let Some(b) = bounds_re().captures(&value) {
                            let n = |i: usize| b[i].parse::<i32>().unwrap_or(0);
                            node.bounds = (n(1), n(2), n(3), n(4));
                            has_bounds = true;
                        }
                    }
                    _ => {}
                }
            }
            has_bounds.then_some(node)
        })
        .collect()
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_from_current_focus() {
        let dump = "  mCurrentFocus=Window{3f2a1b u0 com.android.settings/com.android.settings.Settings}\n";
        assert_eq!(
            parse_foreground(dump),
            Some(ForegroundApp::new("com.android.settings", "com.android.settings.Settings"))
        );
    }

    #[test]
    fn foreground_falls_back_to_focused_app() {
        let dump = "mCurrentFocus=null\n  mFocusedApp=ActivityRecord{a1 u0 com.android.chrome/.Main t12}";
        assert_eq!(
            parse_foreground(dump),
            Some(ForegroundApp::new("com.android.chrome", ".Main"))
        );
    }

    #[test]
    fn foreground_absent_when_nothing_focused() {
        assert_eq!(parse_foreground("mCurrentFocus=null"), None);
    }

    #[test]
    fn wm_size_prefers_override() {
        assert_eq!(parse_wm_size("Physical size: 1080x2400"), Some((1080, 2400)));
        assert_eq!(
            parse_wm_size("Physical size: 1440x3120\nOverride size: 1080x2340"),
            Some((1080, 2340))
        );
        assert_eq!(parse_wm_size("error: no devices"), None);
    }

    #[test]
    fn hierarchy_nodes_parse_with_entities() {
        let xml = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0"><node index="0" text="Tom &amp; Jerry" resource-id="com.x:id/title" class="android.widget.TextView" bounds="[0,100][540,180]" /><node index="1" text="" class="android.widget.EditText" bounds="[10,20][30,40]"></node></hierarchy>"#;
        let nodes = parse_hierarchy(xml);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].text, "Tom & Jerry");
        assert_eq!(nodes[0].resource_id, "com.x:id/title");
        assert_eq!(nodes[0].bounds, (0, 100, 540, 180));
        assert_eq!(nodes[1].class_name, "android.widget.EditText");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
