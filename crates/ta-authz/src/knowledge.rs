// knowledge.rs — The knowledge base: loaded rules grouped by name/arity.
//
// Loading is additive. A second load appends to the existing ordering groups
// and never replaces or clears anything; only `clear()` removes rules. Each
// load is all-or-nothing: every rule is validated before any is appended.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AuthzError;
use crate::rule::{describe_query, Goal, PolicySource, Rule};

/// Identity of an ordering group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleKey {
    pub name: String,
    pub arity: usize,
}

impl RuleKey {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// `(name, arity)` → rules in load order.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    rules: HashMap<RuleKey, Vec<Arc<Rule>>>,
    sources: Vec<String>,
    rule_count: usize,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rules. Returns how many were added.
    pub fn load(&mut self, rules: impl IntoIterator<Item = Rule>) -> Result<usize, AuthzError> {
        let rules: Vec<Rule> = rules.into_iter().collect();
        for rule in &rules {
            validate_rule(rule)?;
        }
        let added = rules.len();
        for rule in rules {
            let key = RuleKey::new(rule.name.clone(), rule.arity());
            self.rules.entry(key).or_default().push(Arc::new(rule));
        }
        self.rule_count += added;
        Ok(added)
    }

    /// Append a named source unit. Rules without a `source` label get the
    /// unit's name. Inline queries are validated here but run by the
    /// `Authorizer`, which needs a host to evaluate them.
    pub fn load_source(&mut self, source: PolicySource) -> Result<usize, AuthzError> {
        let PolicySource { name, rules, queries } = source;
        for query in &queries {
            validate_goals(query).map_err(|reason| AuthzError::InvalidRule {
                rule: describe_query(query),
                reason,
            })?;
        }
        let rules: Vec<Rule> = rules
            .into_iter()
            .map(|mut rule| {
                rule.source.get_or_insert_with(|| name.clone());
                rule
            })
            .collect();
        let added = self.load(rules)?;
        tracing::info!(source = %name, rules = added, "loaded policy source");
        self.sources.push(name);
        Ok(added)
    }

    /// The ordering group for `name/arity`, in load order. Empty if none.
    pub fn rules_for(&self, name: &str, arity: usize) -> &[Arc<Rule>] {
        self.rules
            .get(&RuleKey::new(name, arity))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str, arity: usize) -> bool {
        !self.rules_for(name, arity).is_empty()
    }

    /// All ordering groups, sorted for stable output.
    pub fn keys(&self) -> Vec<(RuleKey, usize)> {
        let mut keys: Vec<(RuleKey, usize)> = self
            .rules
            .iter()
            .map(|(k, v)| (k.clone(), v.len()))
            .collect();
        keys.sort();
        keys
    }

    /// Names of the source units loaded so far, in load order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.rule_count
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count == 0
    }

    pub fn clear(&mut self) {
        self.rules.clear();
        self.sources.clear();
        self.rule_count = 0;
    }
}

/// Structural checks applied at load time.
fn validate_rule(rule: &Rule) -> Result<(), AuthzError> {
    let invalid = |reason: String| AuthzError::InvalidRule {
        rule: rule.to_string(),
        reason,
    };
    if !is_identifier(&rule.name) {
        return Err(invalid(format!("'{}' is not a valid rule name", rule.name)));
    }
    for param in &rule.params {
        if let Some(class) = param.specializer.as_ref().and_then(|s| s.class.as_deref()) {
            if !is_identifier(class) {
                return Err(invalid(format!("'{}' is not a valid class name", class)));
            }
        }
    }
    validate_goals(&rule.body).map_err(invalid)
}

fn validate_goals(goals: &[Goal]) -> Result<(), String> {
    for goal in goals {
        match goal {
            Goal::Call { name, .. } if !is_identifier(name) => {
                return Err(format!("'{}' is not a valid predicate name", name));
            }
            Goal::Lookup { field, .. } if field.is_empty() => {
                return Err("field lookup with empty field name".to_string());
            }
            Goal::Invoke { method, .. } if method.is_empty() => {
                return Err("method call with empty method name".to_string());
            }
            Goal::Not { goals } => validate_goals(goals)?,
            Goal::Any { branches } => {
                if branches.is_empty() {
                    return Err("disjunction with no branches".to_string());
                }
                for branch in branches {
                    validate_goals(branch)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == ':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;

    fn fact(name: &str, args: &[&str]) -> Rule {
        args.iter().fold(Rule::new(name), |r, a| r.param(*a))
    }

    #[test]
    fn load_is_additive() {
        let mut kb = KnowledgeBase::new();
        kb.load(vec![fact("allow", &["alice", "GET", "doc"])]).unwrap();
        kb.load(vec![
            fact("allow", &["bhavik", "GET", "doc"]),
            fact("role", &["alice", "admin"]),
        ])
        .unwrap();

        assert_eq!(kb.len(), 3);
        let group = kb.rules_for("allow", 3);
        assert_eq!(group.len(), 2);
        // Load order preserved within a group.
        assert_eq!(group[0].params[0].term, Term::string("alice"));
        assert_eq!(group[1].params[0].term, Term::string("bhavik"));
        assert!(kb.contains("role", 2));
    }

    #[test]
    fn arity_separates_groups() {
        let mut kb = KnowledgeBase::new();
        kb.load(vec![fact("f", &["a"]), fact("f", &["a", "b"])]).unwrap();
        assert_eq!(kb.rules_for("f", 1).len(), 1);
        assert_eq!(kb.rules_for("f", 2).len(), 1);
        assert!(kb.rules_for("f", 3).is_empty());
        assert_eq!(
            kb.keys(),
            vec![(RuleKey::new("f", 1), 1), (RuleKey::new("f", 2), 1)]
        );
    }

    #[test]
    fn invalid_rule_rejects_whole_load() {
        let mut kb = KnowledgeBase::new();
        let bad = Rule::new("allow").goal(Goal::call("", vec![]));
        let err = kb.load(vec![fact("ok", &["x"]), bad]).unwrap_err();
        match err {
            AuthzError::InvalidRule { reason, .. } => assert!(reason.contains("predicate name")),
            other => panic!("expected InvalidRule, got {:?}", other),
        }
        assert!(kb.is_empty(), "partial load must not leave rules behind");
    }

    #[test]
    fn empty_disjunction_rejected() {
        let mut kb = KnowledgeBase::new();
        let bad = Rule::new("allow").goal(Goal::any(vec![]));
        assert!(kb.load(vec![bad]).is_err());
    }

    #[test]
    fn load_source_labels_rules() {
        let mut kb = KnowledgeBase::new();
        kb.load_source(PolicySource::new("a.polar", vec![fact("allow", &["x"])]))
            .unwrap();
        kb.load_source(PolicySource::new("b.polar", vec![fact("allow", &["y"])]))
            .unwrap();
        let group = kb.rules_for("allow", 1);
        assert_eq!(group[0].source.as_deref(), Some("a.polar"));
        assert_eq!(group[1].source.as_deref(), Some("b.polar"));
        assert_eq!(kb.sources(), ["a.polar".to_string(), "b.polar".to_string()]);
    }

    #[test]
    fn invalid_inline_query_rejects_source() {
        let mut kb = KnowledgeBase::new();
        let source = PolicySource::new("a.polar", vec![fact("allow", &["x"])])
            .with_query(vec![Goal::any(vec![])]);
        match kb.load_source(source).unwrap_err() {
            AuthzError::InvalidRule { rule, .. } => assert!(rule.starts_with("?= ")),
            other => panic!("expected InvalidRule, got {:?}", other),
        }
        assert!(kb.is_empty());
        assert!(kb.sources().is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let mut kb = KnowledgeBase::new();
        kb.load_source(PolicySource::new("a.polar", vec![fact("allow", &["x"])]))
            .unwrap();
        kb.clear();
        assert!(kb.is_empty());
        assert!(kb.keys().is_empty());
        assert!(kb.sources().is_empty());
    }
}
