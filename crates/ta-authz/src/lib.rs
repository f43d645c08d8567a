//! # ta-authz
//!
//! Embeddable rule-based authorization engine for Trusted Autonomy.
//!
//! The application registers its data types, loads "allow" rules, and asks
//! whether an actor may perform an action on a resource. Rules are evaluated
//! by depth-first proof search with backtracking; rule bodies can read
//! fields and call methods on live host objects through the [`Host`] trait.
//!
//! ```rust
//! use ta_authz::{Authorizer, ClassInfo, Goal, MemoryHost, Pattern, Rule, Term};
//!
//! let authz = Authorizer::new();
//! authz.register_class(ClassInfo::new("Expense").field("submitted_by")).unwrap();
//! // allow(actor, "GET", expense: Expense) if actor = expense.submitted_by;
//! authz.load(vec![Rule::new("allow")
//!     .param(Term::var("actor"))
//!     .param("GET")
//!     .specialized(Term::var("expense"), Pattern::class("Expense"))
//!     .goal(Goal::lookup(Term::var("expense"), "submitted_by", Term::var("actor")))])
//!     .unwrap();
//!
//! let mut host = MemoryHost::new();
//! let expense = host.insert("Expense", [("submitted_by", Term::string("alice@example.com"))]);
//! assert!(authz.is_allowed(&host, "alice@example.com", "GET", expense.clone()).unwrap());
//! assert!(!authz.is_allowed(&host, "bhavik@example.com", "GET", expense).unwrap());
//! ```
//!
//! ## Key invariants
//!
//! - **Default deny**: a decision with no proving rule is `false`, never an
//!   error. An empty rule base denies everything.
//! - **Additive loading**: loads append to the knowledge base; only
//!   [`Authorizer::reset`] removes rules.
//! - **Most specific first**: applicable rules are tried subclass before
//!   superclass before unspecialized; ties keep load order.
//! - **Host failures backtrack**: a failing field read or method call fails
//!   its goal and the search moves on to the next alternative.
//! - **Checked sources**: a policy source's inline queries must all succeed
//!   before any of its rules are published.
//! - **Snapshot reads**: queries run against an immutable snapshot, so
//!   concurrent decisions never observe a partial load.

pub mod authorizer;
pub mod bindings;
mod builtins;
pub mod config;
pub mod error;
pub mod host;
pub mod knowledge;
pub mod memory;
pub mod registry;
pub mod resolver;
pub mod rule;
pub mod specializer;
pub mod term;
pub mod unify;

pub use authorizer::{Authorizer, DecisionTrace, EngineState};
pub use config::EngineConfig;
pub use error::{AuthzError, HostError};
pub use host::{Host, HostBridge, NoHost};
pub use knowledge::{KnowledgeBase, RuleKey};
pub use memory::{HostObject, MemoryHost};
pub use registry::{ClassInfo, ClassRegistry, MemberKind};
pub use resolver::{Solution, Solutions};
pub use rule::{ArithOp, CompareOp, Goal, Parameter, PolicySource, Rule};
pub use term::{ExternalInstance, InstanceId, Pattern, Symbol, Term, Value};
