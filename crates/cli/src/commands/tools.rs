//! `stylesmith tools`: Print the tool catalogue the model sees.

use std::sync::Arc;
use stylesmith_config::AppConfig;
use stylesmith_core::artifact::{ArtifactContext, ArtifactTarget};
use stylesmith_core::tool::ToolDescriptor;

use super::session::{build_registry, build_store};

pub fn run(site: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let context = Arc::new(ArtifactContext::with_target(ArtifactTarget::new(site)));
    let registry = build_registry(&config, build_store(&config), context);

    println!();
    for descriptor in registry.descriptors() {
        print!("{}", render_descriptor(&descriptor, &config.conversation.critical_tools));
        println!();
    }
    Ok(())
}

fn render_descriptor(descriptor: &ToolDescriptor, critical: &[String]) -> String {
    let mut tags = vec![if descriptor.is_write { "write" } else { "read" }];
    if critical.iter().any(|c| c == &descriptor.name) {
        tags.push("critical");
    }

    let mut out = format!("  {} [{}]\n    {}\n", descriptor.name, tags.join(", "), descriptor.description);
    for spec in &descriptor.schema.parameters {
        let necessity = if spec.required { "required" } else { "optional" };
        out.push_str(&format!(
            "    - {}: {} ({necessity}) {}\n",
            spec.name,
            spec.param_type.as_str(),
            spec.description
        ));
    }
    out
}
