// check.rs — Decide one (actor, action, resource) request.

use super::Inputs;
use crate::fixture::parse_arg;

/// Print `allow` or `deny` (or the JSON trace with `explain`) and return
/// the decision.
pub fn execute(
    inputs: &Inputs,
    actor: &str,
    action: &str,
    resource: &str,
    explain: bool,
) -> anyhow::Result<bool> {
    let (authz, host) = inputs.load()?;
    let actor = parse_arg(actor, &host)?;
    let action = parse_arg(action, &host)?;
    let resource = parse_arg(resource, &host)?;

    if explain {
        let trace = authz.explain(&host, actor, action, resource)?;
        println!("{}", serde_json::to_string_pretty(&trace)?);
        return Ok(trace.allowed);
    }

    let allowed = authz.is_allowed(&host, actor, action, resource)?;
    println!("{}", if allowed { "allow" } else { "deny" });
    Ok(allowed)
}
