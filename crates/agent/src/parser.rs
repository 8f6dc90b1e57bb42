//! Tool-call parser: extracts directive blocks from free-form model text.
//!
//! The model is instructed (see `system_prompt`) to request tools with a
//! line-oriented protocol:
//!
//! ```text
//! TOOL_CALL: save_css
//! PARAMETERS: {"code": "body { color: red; }"}
//! ```
//!
//! The `TOOL_CALL:` marker may appear anywhere in a line. The `PARAMETERS:`
//! marker may follow on the same line or within the next
//! [`PARAMETER_LOOKAHEAD`] lines; a blank line or another `TOOL_CALL:` ends
//! the search. The JSON object may span several lines and is delimited by
//! a quote-aware, brace-depth-aware scan.
//!
//! Parsing never fails: malformed parameters degrade to an empty mapping so
//! the call still surfaces and the tool can report a parameter error.

use serde_json::{Map, Value};
use stylesmith_core::tool::ToolCall;
use tracing::{debug, warn};

/// Marker that starts a tool invocation.
pub const TOOL_CALL_MARKER: &str = "TOOL_CALL:";

/// Marker that introduces the parameters object.
pub const PARAMETERS_MARKER: &str = "PARAMETERS:";

/// Header of the synthesized tool-results block.
pub const RESULTS_HEADER: &str = "TOOL_RESULTS:";

/// Lines searched after a `TOOL_CALL:` for its `PARAMETERS:` line.
pub const PARAMETER_LOOKAHEAD: usize = 20;

/// One line of the input, with its byte offset.
struct Line<'a> {
    start: usize,
    text: &'a str,
}

impl Line<'_> {
    fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for segment in text.split('\n') {
        lines.push(Line {
            start,
            text: segment,
        });
        start += segment.len() + 1;
    }
    lines
}

/// Index of the line containing byte `offset`.
fn line_index_of(lines: &[Line<'_>], offset: usize) -> usize {
    lines.partition_point(|l| l.start <= offset).saturating_sub(1)
}

/// A `TOOL_CALL:` directive found in one line.
struct Directive<'a> {
    /// Byte index of the marker within the line
    marker_at: usize,
    name: &'a str,
    /// Byte index just past the tool name within the line
    name_end: usize,
}

fn find_directive(line: &str) -> Option<Directive<'_>> {
    let marker_at = line.find(TOOL_CALL_MARKER)?;
    let after_marker = marker_at + TOOL_CALL_MARKER.len();
    let rest = &line[after_marker..];
    let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '`' | '*' | '"'));
    let lead = rest.len() - trimmed.len();
    let name_len = trimmed
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(trimmed.len());
    if name_len == 0 {
        return None;
    }
    Some(Directive {
        marker_at,
        name: &trimmed[..name_len],
        name_end: after_marker + lead + name_len,
    })
}

/// Locate a complete JSON object at the start of `s` (after whitespace).
///
/// Returns the byte range of the object. Braces inside string literals are
/// ignored; backslash escapes inside strings are honored.
pub fn extract_json_object(s: &str) -> Option<(usize, usize)> {
    scan_json_object(s, false)
}

/// Like [`extract_json_object`], but gives up at a line break (outside any
/// string) that is followed by a `TOOL_CALL:` line, so an unterminated
/// payload never runs into the next directive.
fn extract_payload(s: &str) -> Option<(usize, usize)> {
    scan_json_object(s, true)
}

fn scan_json_object(s: &str, stop_at_directive: bool) -> Option<(usize, usize)> {
    let start = s.len() - s.trim_start().len();
    if !s[start..].starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '\n' if stop_at_directive => {
                let next = start + i + 1;
                let next_line = s[next..].split('\n').next().unwrap_or("");
                if find_directive(next_line).is_some() {
                    return None;
                }
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + i + ch.len_utf8();
                    return Some((start, end));
                }
            }
            _ => {}
        }
    }

    None
}

/// A directive block: the call plus the byte ranges it occupies.
struct Block {
    call: ToolCall,
    /// Byte ranges holding directive text (marker, name, parameters payload)
    spans: Vec<(usize, usize)>,
}

fn scan(text: &str) -> Vec<Block> {
    let lines = split_lines(text);
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        let Some(directive) = find_directive(line.text) else {
            i += 1;
            continue;
        };

        let directive_start = line.start + directive.marker_at;

        // PARAMETERS: on the same line, or within the lookahead window.
        let params_at = match line.text[directive.name_end..].find(PARAMETERS_MARKER) {
            Some(p) => Some((i, line.start + directive.name_end + p)),
            None => {
                let last = (i + PARAMETER_LOOKAHEAD).min(lines.len() - 1);
                let mut found = None;
                for (j, candidate) in lines.iter().enumerate().take(last + 1).skip(i + 1) {
                    if candidate.text.trim().is_empty() || find_directive(candidate.text).is_some() {
                        break;
                    }
                    if let Some(p) = candidate.text.find(PARAMETERS_MARKER) {
                        found = Some((j, candidate.start + p));
                        break;
                    }
                }
                found
            }
        };

        let Some((params_line, marker_start)) = params_at else {
            debug!(tool = %directive.name, "Tool call without parameters");
            blocks.push(Block {
                call: ToolCall::bare(directive.name),
                spans: vec![(directive_start, line.end())],
            });
            i += 1;
            continue;
        };

        let payload_start = marker_start + PARAMETERS_MARKER.len();
        let mut spans = if params_line == i {
            Vec::new()
        } else {
            vec![(directive_start, line.end())]
        };
        let block_start = if params_line == i { directive_start } else { marker_start };

        let (parameters, block_end) = match extract_payload(&text[payload_start..]) {
            Some((from, to)) => {
                let raw = &text[payload_start + from..payload_start + to];
                (parse_parameters(directive.name, raw), payload_start + to)
            }
            None => {
                warn!(tool = %directive.name, "PARAMETERS marker without a complete JSON object");
                (Map::new(), lines[params_line].end())
            }
        };
        spans.push((block_start, block_end));

        let last_line = line_index_of(&lines, block_end.saturating_sub(1).max(block_start));
        blocks.push(Block {
            call: ToolCall::new(directive.name, parameters),
            spans,
        });
        i = last_line + 1;
    }

    blocks
}

fn parse_parameters(tool: &str, raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(tool = %tool, kind = ?other, "Tool parameters are not a JSON object");
            Map::new()
        }
        Err(e) => {
            warn!(tool = %tool, error = %e, "Failed to parse tool parameters");
            Map::new()
        }
    }
}

/// Extract every tool call from a block of model text, in source order.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    if !text.contains(TOOL_CALL_MARKER) {
        return Vec::new();
    }
    scan(text).into_iter().map(|b| b.call).collect()
}

/// Remove directive text, parameter payloads and tool-result blocks.
///
/// Lines left empty by the removal are dropped, and runs of blank lines
/// collapse to a single blank line. Pure presentation helper.
pub fn strip_tool_artifacts(text: &str) -> String {
    let mut spans: Vec<(usize, usize)> = scan(text).into_iter().flat_map(|b| b.spans).collect();
    spans.sort_unstable();

    let lines = split_lines(text);
    let mut kept: Vec<String> = Vec::with_capacity(lines.len());
    let mut in_results = false;

    for line in &lines {
        if in_results {
            if line.text.trim().is_empty() {
                in_results = false;
            } else {
                continue;
            }
        }
        if line.text.trim_start().starts_with(RESULTS_HEADER) {
            in_results = true;
            continue;
        }

        let mut out = String::new();
        let mut cursor = line.start;
        let mut touched = false;
        for &(from, to) in &spans {
            if to <= line.start || from >= line.end() {
                continue;
            }
            touched = true;
            let from = from.max(line.start);
            if from > cursor {
                out.push_str(&text[cursor..from]);
            }
            cursor = cursor.max(to.min(line.end()));
        }
        if cursor < line.end() {
            out.push_str(&text[cursor..line.end()]);
        }

        if touched && out.trim().is_empty() {
            continue;
        }
        kept.push(out.trim_end().to_string());
    }

    collapse_blank_runs(&kept)
}

fn collapse_blank_runs(lines: &[String]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_empty() && out.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
