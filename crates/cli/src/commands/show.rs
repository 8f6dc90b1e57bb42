//! `stylesmith show`: Print the stored artifacts of a site.

use stylesmith_config::AppConfig;
use stylesmith_core::artifact::{ArtifactKind, ArtifactTarget};

use super::session::build_store;
use crate::ShowKind;

pub async fn run(site: &str, kind: Option<ShowKind>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = build_store(&config);
    let target = ArtifactTarget::new(site);

    let kinds = match kind {
        Some(ShowKind::Css) => vec![ArtifactKind::Css],
        Some(ShowKind::Js) => vec![ArtifactKind::Js],
        None => vec![ArtifactKind::Css, ArtifactKind::Js],
    };

    for kind in kinds {
        println!("/* ── {} · {} ── */", target.site, kind.file_name());
        match store.load(&target, kind).await? {
            Some(code) => println!("{code}"),
            None => println!("/* (nothing saved yet) */"),
        }
        println!();
    }
    Ok(())
}
