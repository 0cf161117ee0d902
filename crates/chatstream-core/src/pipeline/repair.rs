//! Repairs for malformed frames seen in the wild.
//!
//! Frame-level repairs run on every frame before classification; body-level
//! repairs run on the payload of a `data:` frame right before JSON parsing.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

static DUPLICATED_DATA_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data:"?\s*/?"?data\s?:""#).expect("valid regex"));

static STRAY_EVENT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"event:\s?(?:chunk|message)").expect("valid regex"));

const DATA_PREFIX: &str = "data:";
const QUOTED_DATA_PREFIX: &str = r#""data:"#;
const CONTENT_ENVELOPE: &str = r#""type":"content""#;

/// Applies the frame-level repairs in order:
/// 1. collapse a duplicated/escaped `data:` prefix (`data:"data:"`) and keep
///    only the first of several `data:` payloads glued onto one line,
/// 2. strip stray `event:chunk` / `event:message` markers.
pub fn repair_frame(frame: &str) -> String {
    let collapsed = DUPLICATED_DATA_PREFIX.replace_all(frame, r#"data:""#);
    let first = first_glued_payload(&collapsed);
    STRAY_EVENT_MARKER.replace_all(&first, "").into_owned()
}

/// Appends a closing brace to a JSON object body truncated by a chunk
/// boundary.
pub fn close_truncated_json(body: &str) -> Cow<'_, str> {
    if body.starts_with('{') && !body.ends_with('}') {
        Cow::Owned(format!("{body}}}"))
    } else {
        Cow::Borrowed(body)
    }
}

/// Unwraps a payload that is a quoted string opening with a nested `data:`
/// prefix (`"data: hi"` becomes `" hi"`). Text inside JSON objects is left
/// alone.
pub fn unwrap_nested_data_prefix(body: &str) -> Cow<'_, str> {
    match body.strip_prefix(QUOTED_DATA_PREFIX) {
        Some(rest) if rest.ends_with('"') => Cow::Owned(format!("\"{rest}")),
        _ => Cow::Borrowed(body),
    }
}

/// Keeps `data:<first payload>` when a content-envelope frame carries several
/// payloads back to back (`data:{...}data:{...}`). Only a `data:` that
/// follows a closing brace starts a new payload.
fn first_glued_payload(frame: &str) -> Cow<'_, str> {
    if !frame.contains(CONTENT_ENVELOPE) {
        return Cow::Borrowed(frame);
    }
    let Some(start) = frame.find(DATA_PREFIX) else {
        return Cow::Borrowed(frame);
    };
    let body_start = start + DATA_PREFIX.len();
    let body = &frame[body_start..];
    let next = body.match_indices(DATA_PREFIX).find(|(idx, _)| {
        body[..*idx]
            .trim_end()
            .ends_with('}')
    });
    match next {
        Some((idx, _)) => Cow::Owned(format!("{DATA_PREFIX}{}", body[..idx].trim())),
        None => Cow::Borrowed(frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_duplicated_data_prefix() {
        let repaired = repair_frame(r#"data:"data:"hello""#);
        assert_eq!(repaired, r#"data:"hello""#);
        let repaired = repair_frame(r#"data:" /"data :"x""#);
        assert_eq!(repaired, r#"data:"x""#);
    }

    #[test]
    fn strips_stray_event_markers() {
        assert_eq!(repair_frame("event:chunk"), "");
        assert_eq!(repair_frame("event: message"), "");
        assert_eq!(
            repair_frame(r#"event:messagedata:{"content":"a"}"#),
            r#"data:{"content":"a"}"#
        );
        assert_eq!(repair_frame("event: done"), "event: done");
    }

    #[test]
    fn keeps_first_of_glued_content_payloads() {
        let frame = r#"data:{"type":"content","data":"a"}data:{"type":"content","data":"b"}"#;
        assert_eq!(
            repair_frame(frame),
            r#"data:{"type":"content","data":"a"}"#
        );
    }

    #[test]
    fn nested_data_text_inside_payload_is_not_a_second_payload() {
        let frame = r#"data: {"type":"content","data":"see data: here"}"#;
        assert_eq!(repair_frame(frame), frame);
    }

    #[test]
    fn closes_truncated_object() {
        assert_eq!(close_truncated_json(r#"{"a":"b""#), r#"{"a":"b"}"#);
        assert_eq!(close_truncated_json(r#"{"a":1}"#), r#"{"a":1}"#);
        assert_eq!(close_truncated_json("plain"), "plain");
    }

    #[test]
    fn unwraps_nested_data_string() {
        assert_eq!(unwrap_nested_data_prefix(r#""data: hi""#), r#"" hi""#);
        for untouched in [
            r#"{"content":"x"}"#,
            r#"{"content":"see \"data:x\" in the log"}"#,
            r#"{"type":"content","data":"data: hi"}"#,
        ] {
            assert!(matches!(
                unwrap_nested_data_prefix(untouched),
                Cow::Borrowed(_)
            ));
        }
    }
}
