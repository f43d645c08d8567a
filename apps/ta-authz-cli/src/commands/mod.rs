// mod.rs — Subcommands and the inputs they share.

pub mod check;
pub mod query;
pub mod rules;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use ta_authz::{Authorizer, EngineConfig, Host, MemoryHost, PolicySource};

use crate::fixture::DataFixture;

/// Policy, data and configuration files for an evaluation.
#[derive(Args, Debug)]
pub struct Inputs {
    /// JSON policy source files, loaded in order.
    #[arg(long = "policy", required = true)]
    pub policies: Vec<PathBuf>,
    /// YAML data fixture with classes and named instances.
    #[arg(long)]
    pub data: Option<PathBuf>,
    /// Engine configuration (TOML).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Inputs {
    /// Build an engine with classes from the fixture and all policies loaded,
    /// plus the host holding the fixture's instances.
    pub fn load(&self) -> anyhow::Result<(Authorizer, MemoryHost)> {
        let config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        let authz = Authorizer::with_config(config);

        let fixture = match &self.data {
            Some(path) => DataFixture::from_file(path)?,
            None => DataFixture::default(),
        };
        for class in fixture.class_infos() {
            authz.register_class(class)?;
        }
        let host = fixture.build_host()?;
        for (name, value) in fixture.constant_terms(&host)? {
            authz
                .register_constant(&name, value)
                .with_context(|| format!("failed to register constant {}", name))?;
        }

        load_policies(&authz, &host, &self.policies)?;
        Ok((authz, host))
    }
}

/// Load each policy in order, checking its inline queries against `host`.
pub fn load_policies(authz: &Authorizer, host: &dyn Host, paths: &[PathBuf]) -> anyhow::Result<usize> {
    let mut total = 0;
    for path in paths {
        total += authz
            .load_source_with(host, read_policy(path)?)
            .with_context(|| format!("failed to load policy {}", path.display()))?;
    }
    Ok(total)
}

fn read_policy(path: &Path) -> anyhow::Result<PolicySource> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read policy {}", path.display()))?;
    let mut source = PolicySource::from_json(&content)
        .with_context(|| format!("failed to parse policy {}", path.display()))?;
    if source.name.is_empty() {
        source.name = path.display().to_string();
    }
    Ok(source)
}
