// specializer.rs — Dispatch on parameter specializers.
//
// For a call, the ordering group is filtered by the class part of each
// parameter's specializer and the survivors are ranked most-specific first.
// Field constraints do not take part in filtering: they become `Lookup`
// goals run right after head unification (see `field_goals`), which lets a
// constraint mention variables bound by other arguments.
//
// Ranking compares arguments left to right. For one argument:
//
//   class nearer the value's own class  >  farther ancestor
//   class pattern                        >  field-only pattern
//   any specializer                      >  none
//
// and, at equal class, more field constraints rank higher. Ties keep load
// order (the sort is stable).

use std::cmp::Reverse;
use std::sync::Arc;

use crate::bindings::Bindings;
use crate::error::AuthzError;
use crate::host::HostBridge;
use crate::rule::{Goal, Rule};
use crate::term::{Pattern, Term};

/// Per-argument rank; smaller sorts first.
type ArgRank = (u8, usize, Reverse<usize>);

/// Does the (dereferenced) value satisfy the class part of `pattern`?
///
/// Unbound values never satisfy a class. Naming an unregistered class is a
/// configuration error.
pub fn class_matches(
    value: &Term,
    pattern: &Pattern,
    bindings: &Bindings,
    bridge: &HostBridge<'_>,
) -> Result<bool, AuthzError> {
    let Some(class) = pattern.class.as_deref() else {
        return Ok(true);
    };
    if !bridge.registry().contains(class) {
        return Err(AuthzError::UnregisteredClass {
            class: class.to_string(),
        });
    }
    let value = bindings.walk(value);
    match bridge.class_of(&value)? {
        Some(actual) => Ok(bridge.is_subclass(&actual, class)),
        None => Ok(false),
    }
}

/// Field constraints of `pattern` as lookups on `value`, in field order.
pub fn field_goals(value: &Term, pattern: &Pattern) -> Vec<Goal> {
    pattern
        .fields
        .iter()
        .map(|(field, expected)| Goal::lookup(value.clone(), field.clone(), expected.clone()))
        .collect()
}

/// The applicable rules of an ordering group, most specific first.
pub fn order_rules(
    rules: &[Arc<Rule>],
    args: &[Term],
    bindings: &Bindings,
    bridge: &HostBridge<'_>,
) -> Result<Vec<Arc<Rule>>, AuthzError> {
    let mut ranked: Vec<(Vec<ArgRank>, Arc<Rule>)> = Vec::with_capacity(rules.len());
    'rules: for rule in rules {
        let mut key = Vec::with_capacity(args.len());
        for (param, arg) in rule.params.iter().zip(args) {
            match &param.specializer {
                None => key.push((1, 0, Reverse(0))),
                Some(pattern) => {
                    if !class_matches(arg, pattern, bindings, bridge)? {
                        tracing::trace!(rule = %rule, arg = %bindings.resolve(arg), "specializer rejects argument");
                        continue 'rules;
                    }
                    key.push(rank(arg, pattern, bindings, bridge)?);
                }
            }
        }
        ranked.push((key, Arc::clone(rule)));
    }
    ranked.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(ranked.into_iter().map(|(_, rule)| rule).collect())
}

fn rank(
    arg: &Term,
    pattern: &Pattern,
    bindings: &Bindings,
    bridge: &HostBridge<'_>,
) -> Result<ArgRank, AuthzError> {
    let fields = Reverse(pattern.fields.len());
    let Some(class) = pattern.class.as_deref() else {
        return Ok((0, usize::MAX, fields));
    };
    let value = bindings.walk(arg);
    let distance = match bridge.class_of(&value)? {
        Some(actual) => bridge
            .registry()
            .ancestry(&actual)
            .iter()
            .position(|c| *c == class)
            .unwrap_or(usize::MAX),
        None => usize::MAX,
    };
    Ok((0, distance, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use crate::registry::{ClassInfo, ClassRegistry};

    struct Fixture {
        registry: ClassRegistry,
        host: MemoryHost,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = ClassRegistry::new();
            registry.register(ClassInfo::new("Resource").field("owner")).unwrap();
            registry
                .register(ClassInfo::new("Expense").extends("Resource").field("amount"))
                .unwrap();
            registry.register(ClassInfo::new("User")).unwrap();
            Self {
                registry,
                host: MemoryHost::new(),
            }
        }

        fn bridge(&self) -> HostBridge<'_> {
            HostBridge::new(&self.registry, &self.host)
        }
    }

    fn rule(label: &str, specializer: Option<Pattern>) -> Arc<Rule> {
        let rule = match specializer {
            Some(p) => Rule::new("allow").specialized(Term::var("x"), p),
            None => Rule::new("allow").param(Term::var("x")),
        };
        Arc::new(Rule {
            source: Some(label.to_string()),
            ..rule
        })
    }

    fn labels(rules: &[Arc<Rule>]) -> Vec<&str> {
        rules.iter().map(|r| r.source.as_deref().unwrap_or("")).collect()
    }

    #[test]
    fn subclass_before_superclass_before_unspecialized() {
        let mut fx = Fixture::new();
        let expense: Term = fx.host.insert("Expense", [("amount", Term::integer(5))]).into();
        let rules = vec![
            rule("any", None),
            rule("resource", Some(Pattern::class("Resource"))),
            rule("expense", Some(Pattern::class("Expense"))),
        ];
        let ordered = order_rules(&rules, &[expense], &Bindings::new(), &fx.bridge()).unwrap();
        assert_eq!(labels(&ordered), vec!["expense", "resource", "any"]);
    }

    #[test]
    fn non_matching_specializers_are_filtered() {
        let mut fx = Fixture::new();
        let user: Term = fx.host.insert("User", Vec::<(String, Term)>::new()).into();
        let rules = vec![
            rule("expense", Some(Pattern::class("Expense"))),
            rule("any", None),
            rule("string", Some(Pattern::class("String"))),
        ];
        let ordered = order_rules(&rules, &[user], &Bindings::new(), &fx.bridge()).unwrap();
        assert_eq!(labels(&ordered), vec!["any"]);

        let ordered =
            order_rules(&rules, &[Term::string("alice")], &Bindings::new(), &fx.bridge()).unwrap();
        assert_eq!(labels(&ordered), vec!["string", "any"]);
    }

    #[test]
    fn more_fields_rank_higher_and_ties_keep_load_order() {
        let mut fx = Fixture::new();
        let expense: Term = fx.host.insert("Expense", [("amount", Term::integer(5))]).into();
        let rules = vec![
            rule("first", Some(Pattern::class("Expense"))),
            rule("fields", Some(Pattern::class("Expense").with_field("amount", Term::integer(5)))),
            rule("second", Some(Pattern::class("Expense"))),
            rule("shape", Some(Pattern::default().with_field("amount", Term::var("a")))),
        ];
        let ordered = order_rules(&rules, &[expense], &Bindings::new(), &fx.bridge()).unwrap();
        assert_eq!(labels(&ordered), vec!["fields", "first", "second", "shape"]);
    }

    #[test]
    fn earlier_arguments_break_ties_first() {
        let mut fx = Fixture::new();
        let expense: Term = fx.host.insert("Expense", [("amount", Term::integer(5))]).into();
        let two = |label: &str, a: Option<&str>, b: Option<&str>| {
            let mut r = Rule::new("allow");
            for (name, spec) in [("a", a), ("b", b)] {
                r = match spec {
                    Some(class) => r.specialized(Term::var(name), Pattern::class(class)),
                    None => r.param(Term::var(name)),
                };
            }
            Arc::new(Rule {
                source: Some(label.to_string()),
                ..r
            })
        };
        let rules = vec![
            two("late", None, Some("Expense")),
            two("early", Some("Expense"), None),
            two("both", Some("Resource"), Some("Resource")),
        ];
        let args = [expense.clone(), expense];
        let ordered = order_rules(&rules, &args, &Bindings::new(), &fx.bridge()).unwrap();
        assert_eq!(labels(&ordered), vec!["early", "both", "late"]);
    }

    #[test]
    fn unbound_argument_never_matches_a_class() {
        let fx = Fixture::new();
        let rules = vec![rule("expense", Some(Pattern::class("Expense"))), rule("any", None)];
        let ordered = order_rules(&rules, &[Term::var("q")], &Bindings::new(), &fx.bridge()).unwrap();
        assert_eq!(labels(&ordered), vec!["any"]);
    }

    #[test]
    fn unregistered_specializer_class_is_an_error() {
        let fx = Fixture::new();
        let rules = vec![rule("ghost", Some(Pattern::class("Ghost")))];
        match order_rules(&rules, &[Term::string("x")], &Bindings::new(), &fx.bridge()) {
            Err(AuthzError::UnregisteredClass { class }) => assert_eq!(class, "Ghost"),
            other => panic!("expected UnregisteredClass, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn specializer_monotonicity() {
        // Anything matching a specialized parameter also matches it unspecialized.
        let mut fx = Fixture::new();
        let expense: Term = fx.host.insert("Expense", [("amount", Term::integer(5))]).into();
        let values = vec![expense, Term::string("s"), Term::integer(1), Term::list(vec![])];
        for value in values {
            for class in ["Expense", "Resource", "String", "Integer", "List"] {
                let specialized = vec![rule("s", Some(Pattern::class(class)))];
                let plain = vec![rule("p", None)];
                let b = Bindings::new();
                let s = order_rules(&specialized, &[value.clone()], &b, &fx.bridge()).unwrap();
                let p = order_rules(&plain, &[value.clone()], &b, &fx.bridge()).unwrap();
                assert!(s.len() <= p.len());
            }
        }
    }

    #[test]
    fn field_goals_become_lookups() {
        let pattern = Pattern::class("Expense").with_field("owner", Term::var("actor"));
        let goals = field_goals(&Term::var("e"), &pattern);
        assert_eq!(goals, vec![Goal::lookup(Term::var("e"), "owner", Term::var("actor"))]);
    }
}
