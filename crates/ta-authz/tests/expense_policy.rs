// expense_policy.rs — End-to-end test of a JSON policy against host data.
//
// Exercises the full flow an embedding application goes through:
//
//   1. Load engine configuration from a TOML file
//   2. Register host classes (with inheritance)
//   3. Load a JSON policy source from disk
//   4. Decide requests against in-memory host objects
//   5. Enumerate solutions and explain a decision
//
// VERIFY:
//   - Default deny before any rule is loaded
//   - Specialized rules win over generic ones, subclass before superclass,
//     regardless of load order
//   - A source's inline queries are checked before it is published
//   - Host failures fall through to the next rule instead of erroring
//   - Configuration errors (unknown predicate in a body) surface as errors

use std::fs;

use tempfile::tempdir;

use ta_authz::{
    Authorizer, AuthzError, ClassInfo, EngineConfig, HostError, MemoryHost, PolicySource, Term,
};

const POLICY: &str = r#"{
  "name": "expenses.json",
  "rules": [
    {
      "name": "allow",
      "params": [
        {"term": {"variable": "actor"}},
        {"term": {"atom": "GET"}},
        {"term": {"variable": "expense"}, "specializer": {"class": "Expense"}}
      ],
      "body": [
        {"goal": "lookup", "receiver": {"variable": "expense"},
         "field": "submitted_by", "result": {"variable": "actor"}}
      ]
    },
    {
      "name": "allow",
      "params": [
        {"term": {"variable": "actor"}, "specializer": {"class": "String"}},
        {"term": {"atom": "GET"}},
        {"term": {"variable": "_"}}
      ],
      "body": [
        {"goal": "call", "name": "admin", "args": [{"variable": "actor"}]}
      ]
    },
    {
      "name": "allow",
      "params": [
        {"term": {"variable": "actor"}},
        {"term": {"atom": "APPROVE"}},
        {"term": {"variable": "expense"}, "specializer": {
          "class": "Expense", "fields": {"approver": {"variable": "actor"}}
        }}
      ],
      "body": [
        {"goal": "lookup", "receiver": {"variable": "expense"},
         "field": "amount", "result": {"variable": "amount"}},
        {"goal": "compare", "op": "lt", "left": {"variable": "amount"}, "right": {"atom": 10000}}
      ]
    },
    {
      "name": "allow",
      "params": [
        {"term": {"variable": "actor"}},
        {"term": {"atom": "GET"}},
        {"term": {"variable": "trip"}, "specializer": {"class": "TravelExpense"}}
      ],
      "body": [
        {"goal": "invoke", "receiver": {"variable": "trip"}, "method": "travellers",
         "result": {"variable": "people"}},
        {"goal": "invoke", "receiver": {"variable": "people"}, "method": "contains",
         "args": [{"variable": "actor"}], "result": {"atom": true}}
      ]
    },
    {
      "name": "admin",
      "params": [{"term": {"atom": "root@example.com"}}]
    }
  ]
}"#;

// Why a request is granted. Loaded least specific first, so the proof order
// below comes from specializer ranking and not from load order.
const GRANTS: &str = r#"{
  "name": "grants.json",
  "rules": [
    {
      "name": "grant",
      "params": [
        {"term": {"variable": "actor"}},
        {"term": {"atom": "GET"}},
        {"term": {"variable": "_"}},
        {"term": {"atom": "admin"}}
      ],
      "body": [
        {"goal": "call", "name": "admin", "args": [{"variable": "actor"}]}
      ]
    },
    {
      "name": "grant",
      "params": [
        {"term": {"variable": "actor"}},
        {"term": {"atom": "GET"}},
        {"term": {"variable": "expense"}, "specializer": {"class": "Expense"}},
        {"term": {"atom": "submitter"}}
      ],
      "body": [
        {"goal": "lookup", "receiver": {"variable": "expense"},
         "field": "submitted_by", "result": {"variable": "actor"}}
      ]
    },
    {
      "name": "grant",
      "params": [
        {"term": {"variable": "actor"}},
        {"term": {"atom": "GET"}},
        {"term": {"variable": "trip"}, "specializer": {"class": "TravelExpense"}},
        {"term": {"atom": "traveller"}}
      ],
      "body": [
        {"goal": "invoke", "receiver": {"variable": "trip"}, "method": "travellers",
         "result": {"variable": "people"}},
        {"goal": "invoke", "receiver": {"variable": "people"}, "method": "contains",
         "args": [{"variable": "actor"}], "result": {"atom": true}}
      ]
    }
  ],
  "queries": [
    [{"goal": "call", "name": "admin", "args": [{"atom": "root@example.com"}]}]
  ]
}"#;

struct World {
    host: MemoryHost,
}

fn world() -> World {
    let mut host = MemoryHost::new();
    host.insert_named(
        "expense1",
        "Expense",
        [
            ("submitted_by", Term::string("alice@example.com")),
            ("approver", Term::string("carol@example.com")),
            ("amount", Term::integer(500)),
        ],
    );
    host.insert_named(
        "expense3",
        "Expense",
        [
            ("submitted_by", Term::string("bhavik@example.com")),
            ("approver", Term::string("carol@example.com")),
            ("amount", Term::integer(50000)),
        ],
    );
    host.insert_named(
        "trip1",
        "TravelExpense",
        [
            ("submitted_by", Term::string("alice@example.com")),
            ("approver", Term::string("carol@example.com")),
            ("amount", Term::integer(1200)),
        ],
    );
    host.insert_named("broken", "TravelExpense", [("amount", Term::integer(1))]);
    host.add_method("TravelExpense", "travellers", |obj, _| {
        match obj.fields.get("submitted_by") {
            Some(who) => Ok(Term::list(vec![who.clone(), Term::string("dave@example.com")])),
            None => Err(HostError::Failed("trip has no submitter".to_string())),
        }
    });
    World { host }
}

fn instance(world: &World, name: &str) -> Term {
    world.host.named(name).expect("fixture instance").into()
}

fn engine(dir: &std::path::Path) -> Authorizer {
    let config_path = dir.join("engine.toml");
    fs::write(&config_path, "decision_rule = \"allow\"\nmax_steps = 10000\n").unwrap();
    let config = EngineConfig::from_file(&config_path).unwrap();
    let authz = Authorizer::with_config(config);
    authz
        .register_class(
            ClassInfo::new("Expense")
                .field("submitted_by")
                .field("approver")
                .field("amount"),
        )
        .unwrap();
    authz
        .register_class(ClassInfo::new("TravelExpense").extends("Expense").method("travellers"))
        .unwrap();
    authz
}

#[test]
fn expense_policy_end_to_end() {
    let dir = tempdir().unwrap();
    let w = world();
    let authz = engine(dir.path());

    // Default deny before anything is loaded.
    assert!(!authz
        .is_allowed(&w.host, "alice@example.com", "GET", instance(&w, "expense1"))
        .unwrap());

    let policy_path = dir.path().join("expenses.json");
    fs::write(&policy_path, POLICY).unwrap();
    let source = PolicySource::from_json(&fs::read_to_string(&policy_path).unwrap()).unwrap();
    assert_eq!(authz.load_source(source).unwrap(), 5);

    // Submitter may read their own expense, nobody else's.
    assert!(authz
        .is_allowed(&w.host, "alice@example.com", "GET", instance(&w, "expense1"))
        .unwrap());
    assert!(!authz
        .is_allowed(&w.host, "alice@example.com", "GET", instance(&w, "expense3"))
        .unwrap());

    // Admin rule applies to any resource.
    assert!(authz
        .is_allowed(&w.host, "root@example.com", "GET", instance(&w, "expense3"))
        .unwrap());

    // Specializer field constraint plus body comparison.
    assert!(authz
        .is_allowed(&w.host, "carol@example.com", "APPROVE", instance(&w, "expense1"))
        .unwrap());
    assert!(!authz
        .is_allowed(&w.host, "carol@example.com", "APPROVE", instance(&w, "expense3"))
        .unwrap());
    assert!(!authz
        .is_allowed(&w.host, "alice@example.com", "APPROVE", instance(&w, "expense1"))
        .unwrap());

    // Subclass rule: travellers may read the trip.
    assert!(authz
        .is_allowed(&w.host, "dave@example.com", "GET", instance(&w, "trip1"))
        .unwrap());

    // A failing host method and a missing field both just deny.
    assert!(!authz
        .is_allowed(&w.host, "dave@example.com", "GET", instance(&w, "broken"))
        .unwrap());
}

#[test]
fn solutions_enumerate_every_proof() {
    let dir = tempdir().unwrap();
    let w = world();
    let authz = engine(dir.path());
    authz.load_source(PolicySource::from_json(POLICY).unwrap()).unwrap();

    // What may alice do with trip1? The TravelExpense rule proves GET first,
    // then the generic Expense submitter rule proves it again.
    let actions = |actor: &str| -> Vec<Term> {
        authz
            .query_rule(
                &w.host,
                "allow",
                vec![actor.into(), Term::var("action"), instance(&w, "trip1")],
            )
            .unwrap()
            .map(|s| s.unwrap().get("action").cloned().unwrap())
            .collect()
    };
    assert_eq!(actions("alice@example.com"), vec![Term::string("GET"), Term::string("GET")]);
    assert_eq!(actions("carol@example.com"), vec![Term::string("APPROVE")]);
    assert_eq!(actions("root@example.com"), vec![Term::string("GET")]);
    assert!(actions("mallory@example.com").is_empty());
}

#[test]
fn proofs_follow_specificity_order() {
    let dir = tempdir().unwrap();
    let w = world();
    let authz = engine(dir.path());
    authz.load_source(PolicySource::from_json(POLICY).unwrap()).unwrap();
    assert_eq!(
        authz
            .load_source_with(&w.host, PolicySource::from_json(GRANTS).unwrap())
            .unwrap(),
        3
    );

    let reasons = |actor: &str, resource: &str| -> Vec<Term> {
        authz
            .query_rule(
                &w.host,
                "grant",
                vec![actor.into(), "GET".into(), instance(&w, resource), Term::var("why")],
            )
            .unwrap()
            .map(|s| s.unwrap().get("why").cloned().unwrap())
            .collect()
    };
    // TravelExpense before Expense before the unspecialized rule.
    assert_eq!(
        reasons("alice@example.com", "trip1"),
        vec![Term::string("traveller"), Term::string("submitter")]
    );
    assert_eq!(reasons("dave@example.com", "trip1"), vec![Term::string("traveller")]);
    assert_eq!(reasons("alice@example.com", "expense1"), vec![Term::string("submitter")]);
    assert_eq!(reasons("root@example.com", "expense1"), vec![Term::string("admin")]);
}

#[test]
fn failing_inline_query_rejects_the_source() {
    let dir = tempdir().unwrap();
    let w = world();
    let authz = engine(dir.path());
    // Without POLICY there is no admin/1, so the inline query cannot run.
    assert!(matches!(
        authz.load_source_with(&w.host, PolicySource::from_json(GRANTS).unwrap()),
        Err(AuthzError::UnknownRule { .. })
    ));
    authz
        .load(vec![ta_authz::Rule::new("admin").param("someone@example.com")])
        .unwrap();
    match authz.load_source_with(&w.host, PolicySource::from_json(GRANTS).unwrap()) {
        Err(AuthzError::InlineQueryFailed { source_name, query }) => {
            assert_eq!(source_name, "grants.json");
            assert_eq!(query, r#"?= admin("root@example.com")"#);
        }
        other => panic!("expected InlineQueryFailed, got {:?}", other),
    }
    assert_eq!(authz.rule_count().unwrap(), 1);
}

#[test]
fn explain_reports_the_proof() {
    let dir = tempdir().unwrap();
    let w = world();
    let authz = engine(dir.path());
    authz.load_source(PolicySource::from_json(POLICY).unwrap()).unwrap();

    let trace = authz
        .explain(&w.host, "alice@example.com", "GET", instance(&w, "expense1"))
        .unwrap();
    assert!(trace.allowed);
    assert!(trace.query.starts_with("allow(\"alice@example.com\", \"GET\", Expense<#"));
    assert!(trace.steps.iter().any(|s| s.ends_with(".submitted_by")));

    let json = serde_json::to_value(&trace).unwrap();
    assert_eq!(json["allowed"], serde_json::Value::Bool(true));
}

#[test]
fn undefined_body_predicate_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let w = world();
    let authz = engine(dir.path());
    authz
        .load_source(
            PolicySource::from_json(
                r#"{"name": "broken.json", "rules": [{
                    "name": "allow",
                    "params": [{"term": {"variable": "a"}}, {"term": {"variable": "b"}},
                               {"term": {"variable": "c"}}],
                    "body": [{"goal": "call", "name": "is_manager", "args": [{"variable": "a"}]}]
                }]}"#,
            )
            .unwrap(),
        )
        .unwrap();
    match authz.is_allowed(&w.host, "alice@example.com", "GET", instance(&w, "expense1")) {
        Err(AuthzError::UnknownRule { name, arity }) => {
            assert_eq!(name, "is_manager");
            assert_eq!(arity, 1);
        }
        other => panic!("expected UnknownRule, got {:?}", other),
    }
}

#[test]
fn unregistered_class_in_query_is_error() {
    let authz = Authorizer::new();
    let mut host = MemoryHost::new();
    let doc = host.insert("Document", [("owner", Term::string("alice"))]);
    authz
        .load(vec![ta_authz::Rule::new("allow")
            .param(Term::var("a"))
            .param(Term::var("b"))
            .param(Term::var("c"))])
        .unwrap();
    assert!(matches!(
        authz.is_allowed(&host, "alice", "GET", doc),
        Err(AuthzError::UnregisteredClass { .. })
    ));
}
