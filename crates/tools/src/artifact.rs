//! Artifact tools: read and save the stylesheet and behavior script of the
//! current target.
//!
//! `get_css` / `get_js` are read tools; `save_css` / `save_js` are write
//! tools and replace the whole artifact. All four act on whatever target the
//! shared `ArtifactContext` points at when they run.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use stylesmith_core::artifact::{ArtifactContext, ArtifactKind, ArtifactTarget};
use stylesmith_core::error::ToolError;
use stylesmith_core::tool::{ParamType, ParameterSchema, Tool};
use tracing::info;

use crate::store::ArtifactStore;

fn current_target(context: &ArtifactContext, tool_name: &str) -> Result<ArtifactTarget, ToolError> {
    context.current().ok_or_else(|| ToolError::ExecutionFailed {
        tool_name: tool_name.to_string(),
        reason: "No site selected; set a target before editing artifacts".into(),
    })
}

/// Read the current code of one artifact.
pub struct GetArtifactTool {
    kind: ArtifactKind,
    store: Arc<dyn ArtifactStore>,
    context: Arc<ArtifactContext>,
}

impl GetArtifactTool {
    pub fn new(kind: ArtifactKind, store: Arc<dyn ArtifactStore>, context: Arc<ArtifactContext>) -> Self {
        Self { kind, store, context }
    }

    pub fn css(store: Arc<dyn ArtifactStore>, context: Arc<ArtifactContext>) -> Self {
        Self::new(ArtifactKind::Css, store, context)
    }

    pub fn js(store: Arc<dyn ArtifactStore>, context: Arc<ArtifactContext>) -> Self {
        Self::new(ArtifactKind::Js, store, context)
    }
}

#[async_trait]
impl Tool for GetArtifactTool {
    fn name(&self) -> &str {
        match self.kind {
            ArtifactKind::Css => "get_css",
            ArtifactKind::Js => "get_js",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            ArtifactKind::Css => "Get the current CSS stylesheet of the site. Returns an empty string if none exists yet.",
            ArtifactKind::Js => "Get the current JavaScript userscript of the site. Returns an empty string if none exists yet.",
        }
    }

    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
    }

    fn is_write(&self) -> bool {
        false
    }

    async fn invoke(&self, _parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let target = current_target(&self.context, self.name())?;
        let code = self.store.load(&target, self.kind).await?;
        let exists = code.is_some();
        let code = code.unwrap_or_default();
        Ok(json!({
            "site": target.site,
            "exists": exists,
            "bytes": code.len(),
            "code": code,
        }))
    }
}

/// Replace one artifact with new code.
pub struct SaveArtifactTool {
    kind: ArtifactKind,
    store: Arc<dyn ArtifactStore>,
    context: Arc<ArtifactContext>,
}

impl SaveArtifactTool {
    pub fn new(kind: ArtifactKind, store: Arc<dyn ArtifactStore>, context: Arc<ArtifactContext>) -> Self {
        Self { kind, store, context }
    }

    pub fn css(store: Arc<dyn ArtifactStore>, context: Arc<ArtifactContext>) -> Self {
        Self::new(ArtifactKind::Css, store, context)
    }

    pub fn js(store: Arc<dyn ArtifactStore>, context: Arc<ArtifactContext>) -> Self {
        Self::new(ArtifactKind::Js, store, context)
    }
}

#[async_trait]
impl Tool for SaveArtifactTool {
    fn name(&self) -> &str {
        match self.kind {
            ArtifactKind::Css => "save_css",
            ArtifactKind::Js => "save_js",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            ArtifactKind::Css => "Save the complete CSS stylesheet for the site, replacing the previous one.",
            ArtifactKind::Js => "Save the complete JavaScript userscript for the site, replacing the previous one.",
        }
    }

    fn parameter_schema(&self) -> ParameterSchema {
        let code = match self.kind {
            ArtifactKind::Css => "The complete stylesheet",
            ArtifactKind::Js => "The complete userscript",
        };
        ParameterSchema::new()
            .required("code", ParamType::String, code)
            .optional("summary", ParamType::String, "One line describing the change")
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn invoke(&self, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let code = parameters
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'code' argument".into()))?;

        check_delimiters(self.kind, code).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason,
        })?;

        let target = current_target(&self.context, self.name())?;
        self.store.save(&target, self.kind, code).await?;

        let summary = parameters.get("summary").and_then(Value::as_str);
        info!(
            tool = self.name(),
            site = %target.site,
            bytes = code.len(),
            summary = summary.unwrap_or(""),
            "Artifact updated"
        );

        Ok(json!({
            "site": target.site,
            "bytes": code.len(),
            "summary": summary,
        }))
    }
}

/// Reject code whose brackets do not balance.
///
/// Skips string literals and comments using the lexical rules of `kind`:
/// CSS has only `/* */` comments and quoted strings, JavaScript adds `//`
/// line comments and template literals. Good enough to catch a truncated
/// or cut-and-pasted artifact.
pub fn check_delimiters(kind: ArtifactKind, code: &str) -> Result<(), String> {
    let js = kind == ArtifactKind::Js;
    let bytes = code.as_bytes();
    let mut stack: Vec<(u8, usize)> = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\n' => line += 1,
            b'"' | b'\'' => skip_string(bytes, &mut i, &mut line),
            b'`' if js => skip_string(bytes, &mut i, &mut line),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'/' if js && bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'{' | b'(' | b'[' => stack.push((b, line)),
            b'}' | b')' | b']' => {
                let open = match b {
                    b'}' => b'{',
                    b')' => b'(',
                    _ => b'[',
                };
                match stack.pop() {
                    Some((o, _)) if o == open => {}
                    Some((o, l)) => {
                        return Err(format!(
                            "Mismatched '{}' on line {line}; '{}' opened on line {l}",
                            b as char, o as char
                        ));
                    }
                    None => return Err(format!("Unexpected '{}' on line {line}", b as char)),
                }
            }
            _ => {}
        }
        i += 1;
    }

    match stack.pop() {
        Some((o, l)) => Err(format!("Unclosed '{}' opened on line {l}", o as char)),
        None => Ok(()),
    }
}

// Leaves `i` on the closing quote.
fn skip_string(bytes: &[u8], i: &mut usize, line: &mut usize) {
    let quote = bytes[*i];
    *i += 1;
    while *i < bytes.len() && bytes[*i] != quote {
        if bytes[*i] == b'\\' {
            *i += 1;
        } else if bytes[*i] == b'\n' {
            *line += 1;
        }
        *i += 1;
    }
}
