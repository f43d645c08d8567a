// query.rs — Enumerate solutions of a rule.

use super::Inputs;
use crate::fixture::parse_arg;

pub fn execute(
    inputs: &Inputs,
    rule: &str,
    args: &[String],
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let (authz, host) = inputs.load()?;
    let args = args
        .iter()
        .map(|a| parse_arg(a, &host))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let solutions = authz.query_rule(&host, rule, args)?;
    let mut count = 0;
    for solution in solutions.take(limit.unwrap_or(usize::MAX)) {
        println!("{}", serde_json::to_string(&solution?)?);
        count += 1;
    }
    eprintln!("{} solution(s)", count);
    Ok(())
}
