//! One variant per device primitive. Coordinates are already in device pixels.
use std::fmt;

use serde::Serialize;

use crate::device::DeviceLink;
use crate::errors::MobileClawResult;
use crate::executor::coordinator::DevicePoint;
use crate::launcher::{AppLauncher, LaunchOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    Click { at: DevicePoint },
    LongPress { at: DevicePoint, duration: f64 },
    Drag { from: DevicePoint, to: DevicePoint, duration: f64 },
    Swipe { from: DevicePoint, to: DevicePoint, duration: f64 },
    /// A trailing `\n` submits the field.
    Type { content: String },
    OpenApp { app_name: String },
    PressHome,
    PressBack,
    /// Bookkeeping only; never touches the device.
    Finished { content: String },
}

/// What a command reports about itself; the invoker adds name and index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub ok: bool,
    pub detail: Option<String>,
    pub error: Option<String>,
    pub launch: Option<LaunchOutcome>,
}

impl CommandOutcome {
    fn done() -> Self {
        Self {
            ok: true,
            detail: None,
            error: None,
            launch: None,
        }
    }

    fn with_detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::done()
        }
    }
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Click { .. } => "click",
            Command::LongPress { .. } => "long_press",
            Command::Drag { .. } => "drag",
            Command::Swipe { .. } => "swipe",
            Command::Type { .. } => "type",
            Command::OpenApp { .. } => "open_app",
            Command::PressHome => "press_home",
            Command::PressBack => "press_back",
            Command::Finished { .. } => "finished",
        }
    }

    /// Declared gesture length in seconds; zero for instantaneous commands.
    pub fn duration(&self) -> f64 {
        match self {
            Command::LongPress { duration, .. }
            | Command::Drag { duration, .. }
            | Command::Swipe { duration, .. } => *duration,
            _ => 0.0,
        }
    }

    /// Key into the settle table. Submitting text waits longer than typing it.
    pub fn settle_key(&self) -> &'static str {
        match self {
            Command::Type { content } if content.ends_with('\n') => "type_submit",
            other => other.name(),
        }
    }

    pub async fn execute(&self, link: &dyn DeviceLink, launcher: &AppLauncher) -> MobileClawResult<CommandOutcome> {
        let outcome = match self {
            Command::Click { at } => {
                link.click(at.x, at.y).await?;
                CommandOutcome::done()
            }
            Command::LongPress { at, duration } => {
                link.long_press(at.x, at.y, *duration).await?;
                CommandOutcome::done()
            }
            Command::Drag { from, to, duration } => {
                link.drag(from.x, from.y, to.x, to.y, *duration).await?;
                CommandOutcome::done()
            }
            Command::Swipe { from, to, duration } => {
                link.swipe(from.x, from.y, to.x, to.y, *duration).await?;
                CommandOutcome::done()
            }
            Command::Type { content } => {
                let typed = link.type_text(content).await?;
                CommandOutcome {
                    ok: typed.ok,
                    detail: Some(format!("method={}", typed.method)),
                    error: typed.error,
                    launch: None,
                }
            }
            Command::OpenApp { app_name } => {
                let app = launcher.launch(app_name).await?;
                CommandOutcome {
                    launch: Some(app.clone()),
                    ..CommandOutcome::with_detail(app.to_string())
                }
            }
            Command::PressHome => {
                link.press_home().await?;
                CommandOutcome::done()
            }
            Command::PressBack => {
                link.press_back().await?;
                CommandOutcome::done()
            }
            Command::Finished { content } => CommandOutcome::with_detail(content.clone()),
        };
        Ok(outcome)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Click { at } => write!(f, "click ({}, {})", at.x, at.y),
            Command::LongPress { at, duration } => {
                write!(f, "long_press ({}, {}) {duration:.2}s", at.x, at.y)
            }
            Command::Drag { from, to, duration } | Command::Swipe { from, to, duration } => write!(
                f,
                "{} ({}, {}) -> ({}, {}) {duration:.2}s",
                self.name(),
                from.x,
                from.y,
                to.x,
                to.y
            ),
            Command::Type { content } => write!(f, "type {content:?}"),
            Command::OpenApp { app_name } => write!(f, "open_app {app_name:?}"),
            Command::PressHome => f.write_str("press_home"),
            Command::PressBack => f.write_str("press_back"),
            Command::Finished { content } => write!(f, "finished {content:?}"),
        }
    }
}
