//! System prompt assembly: preamble, directive protocol, tool catalogue.

use std::fmt::Write;
use stylesmith_core::tool::{ToolDescriptor, ToolRegistry};

use crate::parser::{PARAMETERS_MARKER, RESULTS_HEADER, TOOL_CALL_MARKER};

/// Default instructions placed before the protocol section.
pub const DEFAULT_PREAMBLE: &str = "You are stylesmith, an assistant that customizes a website by editing \
two artifacts for the current site: a CSS stylesheet (style) and a JavaScript userscript (behavior). \
Read the current artifact before you change it, and always save the complete artifact, never a fragment.";

/// Render the full system prompt shown to the model.
pub fn build_system_prompt(preamble: Option<&str>, tools: &ToolRegistry) -> String {
    let mut prompt = String::new();
    prompt.push_str(preamble.unwrap_or(DEFAULT_PREAMBLE).trim());
    prompt.push_str("\n\n");
    prompt.push_str(&protocol_section());

    prompt.push_str("\n## Available tools\n");
    let descriptors = tools.descriptors();
    if descriptors.is_empty() {
        prompt.push_str("\nNo tools are available in this session.\n");
    }
    for descriptor in &descriptors {
        prompt.push('\n');
        prompt.push_str(&render_tool(descriptor));
    }
    prompt
}

fn protocol_section() -> String {
    format!(
        "## Tool protocol\n\
To use a tool, write its name on a line starting with {call}, then its parameters as one JSON object after {params}:\n\
\n\
{call} tool_name\n\
{params} {{\"param\": \"value\"}}\n\
\n\
- You may call several tools in one reply. Start each call on its own line.\n\
- The parameters must be valid JSON. Omit the {params} line when a tool takes no parameters.\n\
- Do not mix read tools and write tools in one reply. If you do, only the read tools run and the write calls are withheld until you have seen the results.\n\
- Tool results come back in a message starting with {results}\n\
- When the task is finished, reply without any {call} line.\n",
        call = TOOL_CALL_MARKER,
        params = PARAMETERS_MARKER,
        results = RESULTS_HEADER,
    )
}

fn render_tool(descriptor: &ToolDescriptor) -> String {
    let class = if descriptor.is_write { "write" } else { "read" };
    let mut out = format!("### {} ({})\n{}\n", descriptor.name, class, descriptor.description);
    if descriptor.schema.is_empty() {
        out.push_str("Parameters: none\n");
        return out;
    }
    out.push_str("Parameters:\n");
    for spec in &descriptor.schema.parameters {
        let necessity = if spec.required { "required" } else { "optional" };
        let _ = writeln!(
            out,
            "- {} ({}, {}): {}",
            spec.name,
            spec.param_type.as_str(),
            necessity,
            spec.description
        );
    }
    out
}
