// fixture.rs — YAML data fixtures and command-line term syntax.
//
// A fixture declares host classes and named instances:
//
// ```yaml
// classes:
//   - name: Expense
//     fields: [submitted_by, amount]
//   - name: TravelExpense
//     extends: Expense
// instances:
//   - name: expense1
//     class: Expense
//     fields:
//       submitted_by: alice@example.com
//       amount: 500
// constants:
//   approval_limit: 10000
// ```
//
// Classes are registered in order, so a superclass must come first. A field
// or constant value written `@name` refers to a declared instance (for
// fields, one declared earlier).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use ta_authz::{ClassInfo, MemoryHost, Term};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataFixture {
    #[serde(default)]
    pub classes: Vec<ClassSpec>,
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
    #[serde(default)]
    pub constants: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassSpec {
    pub name: String,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceSpec {
    pub name: String,
    pub class: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_yaml::Value>,
}

impl DataFixture {
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read data fixture {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("failed to parse data fixture {}", path.display()))
    }

    pub fn class_infos(&self) -> Vec<ClassInfo> {
        self.classes
            .iter()
            .map(|spec| {
                let info = ClassInfo::new(spec.name.clone());
                let info = match &spec.extends {
                    Some(parent) => info.extends(parent.clone()),
                    None => info,
                };
                spec.fields.iter().fold(info, |info, f| info.field(f.clone()))
            })
            .collect()
    }

    /// Insert every instance into a fresh host, in declaration order.
    pub fn build_host(&self) -> anyhow::Result<MemoryHost> {
        let mut host = MemoryHost::new();
        for instance in &self.instances {
            if host.named(&instance.name).is_some() {
                bail!("instance '{}' is declared twice", instance.name);
            }
            let mut fields = Vec::with_capacity(instance.fields.len());
            for (field, value) in &instance.fields {
                let term = yaml_to_term(value, &host)
                    .with_context(|| format!("in {}.{}", instance.name, field))?;
                fields.push((field.clone(), term));
            }
            host.insert_named(&instance.name, &instance.class, fields);
        }
        tracing::debug!(instances = host.len(), "built data fixture host");
        Ok(host)
    }

    /// Constant values as terms, resolving `@name` against `host`.
    pub fn constant_terms(&self, host: &MemoryHost) -> anyhow::Result<Vec<(String, Term)>> {
        self.constants
            .iter()
            .map(|(name, value)| {
                let term = yaml_to_term(value, host).with_context(|| format!("in constant {}", name))?;
                Ok((name.clone(), term))
            })
            .collect()
    }
}

fn yaml_to_term(value: &serde_yaml::Value, host: &MemoryHost) -> anyhow::Result<Term> {
    use serde_yaml::Value as Y;
    Ok(match value {
        Y::Bool(b) => Term::boolean(*b),
        Y::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Term::integer(i),
            (None, Some(x)) => Term::float(x),
            (None, None) => bail!("unsupported number {}", n),
        },
        Y::String(s) => match s.strip_prefix('@') {
            Some(name) => instance_ref(name, host)?,
            None => Term::string(s.clone()),
        },
        Y::Sequence(items) => Term::List(
            items
                .iter()
                .map(|item| yaml_to_term(item, host))
                .collect::<anyhow::Result<Vec<_>>>()?,
        ),
        Y::Null => bail!("null values are not supported"),
        Y::Mapping(_) => bail!("nested mappings are not supported; declare an instance and use @name"),
        Y::Tagged(tagged) => yaml_to_term(&tagged.value, host)?,
    })
}

fn instance_ref(name: &str, host: &MemoryHost) -> anyhow::Result<Term> {
    match host.named(name) {
        Some(instance) => Ok(instance.into()),
        None => bail!("unknown instance @{} (instances must be declared before use)", name),
    }
}

/// Parse a command-line argument into a term.
pub fn parse_arg(arg: &str, host: &MemoryHost) -> anyhow::Result<Term> {
    if let Some(name) = arg.strip_prefix('@') {
        return instance_ref(name, host);
    }
    if let Some(var) = arg.strip_prefix('?') {
        if var.is_empty() {
            bail!("'?' must be followed by a variable name");
        }
        return Ok(Term::var(var));
    }
    if let Ok(i) = arg.parse::<i64>() {
        return Ok(Term::integer(i));
    }
    if let Ok(x) = arg.parse::<f64>() {
        if x.is_finite() {
            return Ok(Term::float(x));
        }
    }
    Ok(match arg {
        "true" => Term::boolean(true),
        "false" => Term::boolean(false),
        _ => Term::string(arg),
    })
}
