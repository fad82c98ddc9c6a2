//! Model text -> [`ParsedTurn`].
//!
//! Expected shape:
//!
//! ```text
//! Thought: ...
//! Action: click(point='<point>x y</point>')
//! ```
//!
//! The thought is optional; the action line is not. Only the first call
//! expression is parsed.
use std::sync::OnceLock;

use regex::Regex;

use crate::action::literal::{
    bare_arg, named_point, string_arg, tagged_point, tagged_points,
};
use crate::action::types::{Action, ActionKind, ParsedTurn, ScrollDirection};
use crate::errors::{MobileClawError, MobileClawResult};
use crate::executor::coordinator::RenderPoint;

/// Names tried, in order, for single-point actions.
const SINGLE_POINT_NAMES: [&str; 3] = ["point", "start_point", "start_box"];

fn action_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?ims)^[ \t]*Action[ \t]*:\s*(.+)\z").expect("action line regex must compile")
    })
}

fn action_inline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)Action\s*:\s*(.+)\z").expect("action regex must compile"))
}

fn thought_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)Thought\s*:\s*(.*)\z").expect("thought regex must compile"))
}

fn func_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z_]\w*)\s*\(").expect("func regex must compile"))
}

fn call_args_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*[A-Za-z_]\w*\s*\((.*)\)\s*\z").expect("args regex must compile")
    })
}

fn malformed(msg: impl Into<String>) -> MobileClawError {
    MobileClawError::MalformedOutput(msg.into())
}

/// Parses one model turn. Never trusts the text to be well-formed.
pub fn parse(text: &str) -> MobileClawResult<ParsedTurn> {
    let text = text.trim();

    // Prefer an `Action:` at the start of a line so a thought that mentions
    // "action:" doesn't swallow the real call.
    let caps = action_line_re()
        .captures(text)
        .or_else(|| action_inline_re().captures(text))
        .ok_or_else(|| malformed("no `Action:` section found"))?;
    let (section_start, raw_action) = match (caps.get(0), caps.get(1)) {
        (Some(whole), Some(body)) => (whole.start(), body.as_str().trim().to_string()),
        _ => return Err(malformed("no `Action:` section found")),
    };

    let thought = thought_re()
        .captures(&text[..section_start])
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    let func = func_name_re()
        .captures(&raw_action)
        .map(|c| c[1].to_string())
        .ok_or_else(|| malformed(format!("unrecognized action call: {raw_action}")))?;
    let kind: ActionKind = func
        .parse()
        .map_err(|e: MobileClawError| malformed(e.to_string()))?;

    let args = call_args_re()
        .captures(&raw_action)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    let action = build_action(kind, &raw_action, &args)?;
    tracing::debug!(action = %action.name(), raw = %raw_action, "model action parsed");

    Ok(ParsedTurn {
        thought,
        actions: vec![action],
        raw_action,
    })
}

fn build_action(kind: ActionKind, call: &str, args: &str) -> MobileClawResult<Action> {
    let action = match kind {
        ActionKind::Click | ActionKind::LongPress => {
            let point = single_point(call, args)
                .ok_or_else(|| malformed(format!("{} needs point (or start_point/start_box)", kind.as_str())))?;
            if kind == ActionKind::Click {
                Action::Click { point }
            } else {
                Action::LongPress { point }
            }
        }
        ActionKind::Type => Action::Type {
            content: string_arg("content", call)
                .ok_or_else(|| malformed("type needs content='...'"))?,
        },
        ActionKind::Scroll => {
            let point = single_point(call, args);
            let direction = string_arg("direction", call).or_else(|| bare_arg("direction", call));
            let (point, direction) = match (point, direction) {
                (Some(p), Some(d)) => (p, d),
                _ => return Err(malformed("scroll needs point and direction")),
            };
            let direction: ScrollDirection = direction
                .parse()
                .map_err(|e: MobileClawError| malformed(e.to_string()))?;
            Action::Scroll { point, direction }
        }
        ActionKind::OpenApp => Action::OpenApp {
            app_name: string_arg("app_name", call)
                .ok_or_else(|| malformed("open_app needs app_name='...'"))?,
        },
        ActionKind::Drag => {
            let (start_point, end_point) = drag_points(call, args)
                .ok_or_else(|| malformed("drag needs start_point and end_point"))?;
            Action::Drag {
                start_point,
                end_point,
            }
        }
        ActionKind::Hotkey => {
            let key = string_arg("key", call)
                .filter(|k| !k.trim().is_empty())
                .or_else(|| string_arg("hotkey", call))
                .or_else(|| bare_arg("key", call))
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .ok_or_else(|| malformed("hotkey needs key='...'"))?;
            Action::Hotkey { key }
        }
        ActionKind::Finished => Action::Finished {
            content: string_arg("content", call).unwrap_or_default(),
        },
        ActionKind::PressHome => Action::PressHome,
        ActionKind::PressBack => Action::PressBack,
        // Any `seconds=` argument is ignored; the executor waits a fixed time.
        ActionKind::Wait => Action::Wait,
    };
    Ok(action)
}

fn single_point(call: &str, args: &str) -> Option<RenderPoint> {
    tagged_point(args).or_else(|| {
        SINGLE_POINT_NAMES
            .iter()
            .find_map(|name| named_point(name, call))
    })
}

fn drag_points(call: &str, args: &str) -> Option<(RenderPoint, RenderPoint)> {
    let mut start = named_point("start_point", call).or_else(|| named_point("start_box", call));
    let mut end = named_point("end_point", call).or_else(|| named_point("end_box", call));

    if start.is_none() || end.is_none() {
        let tags = tagged_points(args);
        if tags.len() >= 2 {
            start = start.or(Some(tags[0]));
            end = end.or(Some(tags[1]));
        }
    }
    Some((start?, end?))
}
