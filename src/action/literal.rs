//! Argument extraction from a single call expression.
//!
//! The model writes Python-ish keyword arguments. Values are quoted string
//! literals, sometimes with raw control characters leaked in, and points come in
//! several encodings.
use std::sync::OnceLock;

use regex::Regex;

use crate::executor::coordinator::RenderPoint;

const NUM: &str = r"(-?\d+(?:\.\d+)?)";

fn tagged_point_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?is)<point>\s*{NUM}(?:\s+|\s*,\s*){NUM}\s*</point>"))
            .expect("point regex must compile")
    })
}

fn bare_tuple_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\(\s*{NUM}\s*,\s*{NUM}\s*(?:,\s*{NUM}\s*,\s*{NUM}\s*)?\)"
        ))
        .expect("tuple regex must compile")
    })
}

/// Matches `name=` on a word boundary so `point` never hits `start_point`.
fn arg_prefix(name: &str) -> String {
    format!(r"(?:^|[^\w]){}\s*=\s*", regex::escape(name))
}

/// First `<point>x y</point>` in `s`.
pub fn tagged_point(s: &str) -> Option<RenderPoint> {
    tagged_point_re()
        .captures(s)
        .and_then(|caps| point_from(&caps[1], &caps[2]))
}

/// Every `<point>` in `s`, in order.
pub fn tagged_points(s: &str) -> Vec<RenderPoint> {
    tagged_point_re()
        .captures_iter(s)
        .filter_map(|caps| point_from(&caps[1], &caps[2]))
        .collect()
}

/// `name='(x,y)'` with matching quotes.
pub fn tuple_arg(name: &str, call: &str) -> Option<RenderPoint> {
    let pattern = format!(
        r#"{}(['"])\(\s*([-\d.]+)\s*,\s*([-\d.]+)\s*\)(['"])"#,
        arg_prefix(name)
    );
    let re = Regex::new(&pattern).ok()?;
    let hit = re
        .captures_iter(call)
        .find(|caps| caps[1] == caps[4])
        .and_then(|caps| point_from(&caps[2], &caps[3]));
    hit
}

/// A point anywhere inside an already-decoded literal: a tag, an `(x,y)` tuple
/// (possibly wrapped in box tokens), or the centre of an `(x1,y1,x2,y2)` box.
pub fn point_in_literal(s: &str) -> Option<RenderPoint> {
    if let Some(p) = tagged_point(s) {
        return Some(p);
    }
    let caps = bare_tuple_re().captures(s)?;
    let first = point_from(&caps[1], &caps[2])?;
    match (caps.get(3), caps.get(4)) {
        (Some(x2), Some(y2)) => {
            let second = point_from(x2.as_str(), y2.as_str())?;
            Some(RenderPoint::new(
                (first.x + second.x) / 2.0,
                (first.y + second.y) / 2.0,
            ))
        }
        _ => Some(first),
    }
}

/// `name=` followed by a point in any supported encoding.
pub fn named_point(name: &str, call: &str) -> Option<RenderPoint> {
    tuple_arg(name, call).or_else(|| string_arg(name, call).and_then(|s| point_in_literal(&s)))
}

/// Decoded value of `name='...'` or `name="..."`.
///
/// The literal ends at the first unescaped occurrence of its own quote character.
pub fn string_arg(name: &str, call: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"{}(['"])"#, arg_prefix(name))).ok()?;
    let caps = re.captures(call)?;
    let open = caps.get(1)?;
    let quote = call[open.start()..open.end()].chars().next()?;
    let body = &call[open.end()..];

    let mut escaped = false;
    let mut end = None;
    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            end = Some(i);
            break;
        }
    }
    decode_literal(&body[..end?])
}

/// Unquoted identifier value, e.g. `direction=down`.
pub fn bare_arg(name: &str, call: &str) -> Option<String> {
    let re = Regex::new(&format!(r"{}([A-Za-z_]\w*)", arg_prefix(name))).ok()?;
    re.captures(call).map(|caps| caps[1].to_string())
}

/// Strict unescape, then a second pass with raw control characters escaped.
pub fn decode_literal(inner: &str) -> Option<String> {
    unescape(inner)
        .or_else(|_| unescape(&escape_control_chars(inner)))
        .ok()
}

fn escape_control_chars(s: &str) -> String {
    s.replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

#[derive(Debug, PartialEq)]
enum UnescapeError {
    RawLineBreak,
    DanglingBackslash,
}

fn unescape(s: &str) -> Result<String, UnescapeError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' | '\r' => return Err(UnescapeError::RawLineBreak),
            '\\' => {
                let next = chars.next().ok_or(UnescapeError::DanglingBackslash)?;
                match next {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    // Line continuation.
                    '\n' => {}
                    'x' | 'u' => {
                        let width = if next == 'x' { 2 } else { 4 };
                        let hex: String = chars.clone().take(width).collect();
                        match (hex.len() == width)
                            .then(|| u32::from_str_radix(&hex, 16).ok())
                            .flatten()
                            .and_then(char::from_u32)
                        {
                            Some(decoded) => {
                                out.push(decoded);
                                for _ in 0..width {
                                    chars.next();
                                }
                            }
                            None => {
                                out.push('\\');
                                out.push(next);
                            }
                        }
                    }
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn point_from(x: &str, y: &str) -> Option<RenderPoint> {
    let x: f64 = x.parse().ok()?;
    let y: f64 = y.parse().ok()?;
    Some(RenderPoint::new(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_point_tolerates_spacing_and_commas() {
        assert_eq!(tagged_point("<point> 10  20 </point>"), Some(RenderPoint::new(10.0, 20.0)));
        assert_eq!(tagged_point("<POINT>1.5,2</POINT>"), Some(RenderPoint::new(1.5, 2.0)));
        assert_eq!(tagged_point("<point>12</point>"), None);
    }

    #[test]
    fn string_arg_stops_at_own_quote() {
        let call = r#"type(content="say 'hi'")"#;
        assert_eq!(string_arg("content", call).as_deref(), Some("say 'hi'"));
    }

    #[test]
    fn string_arg_honors_escaped_quote() {
        let call = r"finished(content='it\'s done')";
        assert_eq!(string_arg("content", call).as_deref(), Some("it's done"));
    }

    #[test]
    fn raw_newline_survives_recovery_pass() {
        let call = "type(content='line one\nline two')";
        assert_eq!(string_arg("content", call).as_deref(), Some("line one\nline two"));
    }

    #[test]
    fn escapes_decode() {
        assert_eq!(decode_literal(r"a\tb\\c\x41é").as_deref(), Some("a\tb\\cAé"));
        assert_eq!(decode_literal(r"keep \d").as_deref(), Some(r"keep \d"));
        assert_eq!(decode_literal("dangling\\"), None);
    }

    #[test]
    fn name_matching_respects_word_boundary() {
        let call = "drag(start_point='(1,2)', end_point='(3,4)')";
        assert_eq!(tuple_arg("point", call), None);
        assert_eq!(tuple_arg("start_point", call), Some(RenderPoint::new(1.0, 2.0)));
        assert_eq!(tuple_arg("end_point", call), Some(RenderPoint::new(3.0, 4.0)));
    }

    #[test]
    fn tuple_requires_matching_quotes() {
        assert_eq!(tuple_arg("point", "click(point='(1,2)\")"), None);
        assert_eq!(tuple_arg("point", "click(point=\"(1,2)\")"), Some(RenderPoint::new(1.0, 2.0)));
    }

    #[test]
    fn box_tokens_and_four_tuples_resolve() {
        assert_eq!(
            point_in_literal("<|box_start|>(546,1167)<|box_end|>"),
            Some(RenderPoint::new(546.0, 1167.0))
        );
        assert_eq!(
            point_in_literal("(100,200,300,400)"),
            Some(RenderPoint::new(200.0, 300.0))
        );
    }

    #[test]
    fn bare_identifier_value() {
        assert_eq!(bare_arg("direction", "scroll(point='(1,2)', direction=Down)").as_deref(), Some("Down"));
    }
}
