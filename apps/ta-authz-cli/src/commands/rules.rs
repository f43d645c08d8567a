// rules.rs — List loaded rule groups.

use std::path::PathBuf;

use ta_authz::{Authorizer, NoHost};

use super::load_policies;

pub fn execute(policies: &[PathBuf]) -> anyhow::Result<()> {
    let authz = Authorizer::new();
    let total = load_policies(&authz, &NoHost, policies)?;
    for (key, count) in authz.rule_keys()? {
        println!("{:<32} {}", key.to_string(), count);
    }
    println!();
    println!("{} rule(s) from {} source(s)", total, policies.len());
    Ok(())
}
