//! Parsed [`Action`] -> device [`Command`]s -> [`Invoker`].
use std::sync::Arc;
use std::time::Duration;

use crate::action::{Action, ScrollDirection};
use crate::config::{DeviceConfig, ExecutorConfig};
use crate::device::DeviceLink;
use crate::errors::{MobileClawError, MobileClawResult};
use crate::executor::commands::Command;
use crate::executor::coordinator::{CoordinateMapper, RenderFrame, RenderPoint};
use crate::executor::invoker::{ExecutionResult, Invoker};

pub struct ActionExecutor {
    link: Arc<dyn DeviceLink>,
    invoker: Invoker,
    frame: RenderFrame,
    config: ExecutorConfig,
    fallback_size: (u32, u32),
}

impl ActionExecutor {
    pub fn new(
        link: Arc<dyn DeviceLink>,
        invoker: Invoker,
        frame: RenderFrame,
        config: ExecutorConfig,
        device: &DeviceConfig,
    ) -> Self {
        Self {
            link,
            invoker,
            frame,
            config,
            fallback_size: (device.fallback_width, device.fallback_height),
        }
    }

    pub fn frame(&self) -> &RenderFrame {
        &self.frame
    }

    /// The next action maps through `frame`.
    pub fn set_frame(&mut self, frame: RenderFrame) {
        self.frame = frame;
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Queried on every call; rotation or resolution may change mid-session.
    async fn mapper(&self) -> CoordinateMapper {
        let (w, h) = match self.link.window_size().await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback_w = self.fallback_size.0,
                    fallback_h = self.fallback_size.1,
                    "device size unavailable, using fallback"
                );
                self.fallback_size
            }
        };
        CoordinateMapper::new(self.frame, w, h)
    }

    pub async fn execute(&self, action: &Action) -> MobileClawResult<Vec<ExecutionResult>> {
        if let Action::Wait = action {
            let seconds = self.config.wait_s.max(0.0);
            tracing::info!(dry_run = self.config.dry_run, "[wait] sleep {seconds:.2}s");
            if !self.config.dry_run {
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            }
            return Ok(vec![ExecutionResult {
                detail: Some(format!("sleep {seconds:.2}s")),
                ..ExecutionResult::synthetic("wait", 1)
            }]);
        }

        let mapper = self.mapper().await;
        let commands = build_commands(action, &mapper, &self.frame, &self.config)?;

        if self.config.dry_run {
            return Ok(commands
                .iter()
                .enumerate()
                .map(|(i, command)| {
                    tracing::info!(index = i + 1, "[dry-run] {command}");
                    ExecutionResult::synthetic(command.name(), i + 1)
                })
                .collect());
        }

        self.invoker.run(&commands).await
    }
}

/// Pure translation; every point goes through `mapper` exactly once.
pub fn build_commands(
    action: &Action,
    mapper: &CoordinateMapper,
    frame: &RenderFrame,
    config: &ExecutorConfig,
) -> MobileClawResult<Vec<Command>> {
    let command = match action {
        Action::Click { point } => Command::Click {
            at: mapper.to_device(*point),
        },
        Action::LongPress { point } => Command::LongPress {
            at: mapper.to_device(*point),
            duration: config.long_press_s,
        },
        Action::Drag {
            start_point,
            end_point,
        } => Command::Drag {
            from: mapper.to_device(*start_point),
            to: mapper.to_device(*end_point),
            duration: config.drag_s,
        },
        Action::Type { content } => Command::Type {
            content: content.clone(),
        },
        Action::OpenApp { app_name } => Command::OpenApp {
            app_name: app_name.clone(),
        },
        Action::Scroll { point, direction } => {
            let end = scroll_end(*point, *direction, frame, config.scroll_frac);
            Command::Swipe {
                from: mapper.to_device(*point),
                to: mapper.to_device(end),
                duration: config.swipe_s,
            }
        }
        Action::Hotkey { key } => hotkey_command(key)?,
        Action::PressHome => Command::PressHome,
        Action::PressBack => Command::PressBack,
        Action::Finished { content } => Command::Finished {
            content: content.clone(),
        },
        Action::Wait => {
            return Err(MobileClawError::UnsupportedAction(
                "wait has no device command".into(),
            ))
        }
    };
    Ok(vec![command])
}

/// Finger end point in render space. Content scrolls opposite to the finger:
/// scrolling down means swiping up.
pub fn scroll_end(
    start: RenderPoint,
    direction: ScrollDirection,
    frame: &RenderFrame,
    scroll_frac: f64,
) -> RenderPoint {
    let dy = scroll_frac * frame.height as f64;
    let dx = scroll_frac * frame.width as f64;
    match direction {
        ScrollDirection::Up => RenderPoint::new(start.x, start.y + dy),
        ScrollDirection::Down => RenderPoint::new(start.x, start.y - dy),
        ScrollDirection::Left => RenderPoint::new(start.x + dx, start.y),
        ScrollDirection::Right => RenderPoint::new(start.x - dx, start.y),
    }
}

pub fn hotkey_command(key: &str) -> MobileClawResult<Command> {
    match key.trim().to_lowercase().as_str() {
        // Submitting through the IME; settles as `type_submit`.
        "enter" | "return" | "search" | "go" => Ok(Command::Type {
            content: "\n".into(),
        }),
        "back" | "esc" => Ok(Command::PressBack),
        "home" | "meta" => Ok(Command::PressHome),
        other => Err(MobileClawError::InvalidHotkey(other.to_string())),
    }
}
