use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{MobileClawError, MobileClawResult};
use crate::executor::coordinator::RenderPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }
}

impl FromStr for ScrollDirection {
    type Err = MobileClawError;

    fn from_str(s: &str) -> MobileClawResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            _ => Err(MobileClawError::InvalidDirection(s.to_string())),
        }
    }
}

/// The function names the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Click,
    LongPress,
    Type,
    Scroll,
    OpenApp,
    Drag,
    PressHome,
    PressBack,
    Hotkey,
    Wait,
    Finished,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::LongPress => "long_press",
            ActionKind::Type => "type",
            ActionKind::Scroll => "scroll",
            ActionKind::OpenApp => "open_app",
            ActionKind::Drag => "drag",
            ActionKind::PressHome => "press_home",
            ActionKind::PressBack => "press_back",
            ActionKind::Hotkey => "hotkey",
            ActionKind::Wait => "wait",
            ActionKind::Finished => "finished",
        }
    }
}

impl FromStr for ActionKind {
    type Err = MobileClawError;

    fn from_str(s: &str) -> MobileClawResult<Self> {
        Ok(match s {
            "click" => ActionKind::Click,
            "long_press" => ActionKind::LongPress,
            "type" => ActionKind::Type,
            "scroll" => ActionKind::Scroll,
            "open_app" => ActionKind::OpenApp,
            "drag" => ActionKind::Drag,
            "press_home" => ActionKind::PressHome,
            "press_back" => ActionKind::PressBack,
            "hotkey" => ActionKind::Hotkey,
            "wait" => ActionKind::Wait,
            "finished" => ActionKind::Finished,
            other => return Err(MobileClawError::UnsupportedAction(other.to_string())),
        })
    }
}

/// One parsed model action. Each variant carries exactly its required params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click { point: RenderPoint },
    LongPress { point: RenderPoint },
    Type { content: String },
    Scroll { point: RenderPoint, direction: ScrollDirection },
    OpenApp { app_name: String },
    Drag { start_point: RenderPoint, end_point: RenderPoint },
    PressHome,
    PressBack,
    Hotkey { key: String },
    Wait,
    Finished { content: String },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Click { .. } => ActionKind::Click,
            Action::LongPress { .. } => ActionKind::LongPress,
            Action::Type { .. } => ActionKind::Type,
            Action::Scroll { .. } => ActionKind::Scroll,
            Action::OpenApp { .. } => ActionKind::OpenApp,
            Action::Drag { .. } => ActionKind::Drag,
            Action::PressHome => ActionKind::PressHome,
            Action::PressBack => ActionKind::PressBack,
            Action::Hotkey { .. } => ActionKind::Hotkey,
            Action::Wait => ActionKind::Wait,
            Action::Finished { .. } => ActionKind::Finished,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Finished { .. })
    }

    /// Renders the action back into the call grammar the model speaks.
    pub fn render(&self, encoding: PointEncoding) -> String {
        let name = self.name();
        match self {
            Action::Click { point } | Action::LongPress { point } => {
                format!("{name}({})", encoding.single(point))
            }
            Action::Scroll { point, direction } => format!(
                "{name}({}, direction='{}')",
                encoding.single(point),
                direction.as_str()
            ),
            Action::Drag {
                start_point,
                end_point,
            } => {
                let (start_name, end_name) = match encoding {
                    PointEncoding::LegacyBox => ("start_box", "end_box"),
                    _ => ("start_point", "end_point"),
                };
                format!(
                    "{name}({start_name}={}, {end_name}={})",
                    encoding.literal(start_point),
                    encoding.literal(end_point)
                )
            }
            Action::Type { content } | Action::Finished { content } => {
                format!("{name}(content={})", quote_literal(content))
            }
            Action::OpenApp { app_name } => format!("{name}(app_name={})", quote_literal(app_name)),
            Action::Hotkey { key } => format!("{name}(key={})", quote_literal(key)),
            Action::PressHome | Action::PressBack | Action::Wait => format!("{name}()"),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render(PointEncoding::Tagged))
    }
}

/// The point encodings models have emitted over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointEncoding {
    /// `point='<point>x y</point>'`
    Tagged,
    /// `point='(x,y)'`
    Tuple,
    /// `start_box='(x,y)'`
    LegacyBox,
}

impl PointEncoding {
    fn single(&self, point: &RenderPoint) -> String {
        match self {
            PointEncoding::LegacyBox => format!("start_box={}", self.literal(point)),
            _ => format!("point={}", self.literal(point)),
        }
    }

    fn literal(&self, point: &RenderPoint) -> String {
        match self {
            PointEncoding::Tagged => format!("'<point>{} {}</point>'", point.x, point.y),
            PointEncoding::Tuple | PointEncoding::LegacyBox => {
                format!("'({},{})'", point.x, point.y)
            }
        }
    }
}

/// Single-quoted literal with the escapes the parser understands.
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// One model turn after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTurn {
    pub thought: String,
    /// Always one action today; kept as a list so multi-action turns fit later.
    pub actions: Vec<Action>,
    pub raw_action: String,
}

impl ParsedTurn {
    pub fn action(&self) -> Option<&Action> {
        self.actions.first()
    }

    pub fn is_finished(&self) -> bool {
        self.actions.iter().any(Action::is_terminal)
    }
}
