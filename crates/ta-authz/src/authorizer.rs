// authorizer.rs — The decision API.
//
// `Authorizer` owns the knowledge base and class registry. Queries run
// against an immutable snapshot (`Arc<EngineState>`) taken under a short
// read lock, so any number of decisions proceed concurrently. Writers
// (`load`, `register_class`, `register_constant`, `reset`) build a modified
// copy and publish it under the write lock; an in-flight query never sees a
// partial load. A policy source's inline queries run against the copy
// before it is published.
//
// Default deny: if no rule proves the decision predicate, the answer is
// `false`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::AuthzError;
use crate::host::{Host, NoHost};
use crate::knowledge::{KnowledgeBase, RuleKey};
use crate::registry::{ClassInfo, ClassRegistry};
use crate::resolver::{Resolver, Solution, Solutions};
use crate::rule::{describe_query, PolicySource, Rule};
use crate::term::{Symbol, Term};

/// One published version of the engine's rules and classes.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub(crate) kb: KnowledgeBase,
    pub(crate) registry: ClassRegistry,
    pub(crate) constants: BTreeMap<Symbol, Term>,
}

impl EngineState {
    #[cfg(test)]
    pub(crate) fn new(kb: KnowledgeBase, registry: ClassRegistry) -> Self {
        Self {
            kb,
            registry,
            constants: BTreeMap::new(),
        }
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Value registered under `name`, if any.
    pub fn constant(&self, name: &str) -> Option<&Term> {
        self.constants.get(&Symbol::new(name))
    }
}

/// Record of one decision: the outcome, every goal the resolver executed
/// (with bindings applied), and the bindings of the proof that allowed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    /// The query as evaluated, e.g. `allow("alice", "GET", Expense<#1>)`.
    pub query: String,
    pub allowed: bool,
    /// Goals in execution order, failed branches included.
    pub steps: Vec<String>,
    /// Bindings of the variables passed as query arguments, if allowed.
    pub solution: Option<Solution>,
    pub evaluated_at: DateTime<Utc>,
}

/// Embeddable authorization engine.
#[derive(Debug)]
pub struct Authorizer {
    state: RwLock<Arc<EngineState>>,
    config: EngineConfig,
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorizer {
    /// An engine with no rules and only the built-in classes. Denies everything.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            state: RwLock::new(Arc::new(EngineState::default())),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current snapshot of rules and classes.
    pub fn snapshot(&self) -> Result<Arc<EngineState>, AuthzError> {
        let guard = self
            .state
            .read()
            .map_err(|e| AuthzError::LockPoisoned(e.to_string()))?;
        Ok(Arc::clone(&guard))
    }

    /// Apply `change` to a copy of the state and publish it if it succeeds.
    fn update<T>(
        &self,
        change: impl FnOnce(&mut EngineState) -> Result<T, AuthzError>,
    ) -> Result<T, AuthzError> {
        self.update_checked(change, |_| Ok(()))
    }

    /// Like `update`, but `check` must also accept the finished copy before
    /// it replaces the published state.
    fn update_checked<T>(
        &self,
        change: impl FnOnce(&mut EngineState) -> Result<T, AuthzError>,
        check: impl FnOnce(&Arc<EngineState>) -> Result<(), AuthzError>,
    ) -> Result<T, AuthzError> {
        let mut guard = self
            .state
            .write()
            .map_err(|e| AuthzError::LockPoisoned(e.to_string()))?;
        let mut next = EngineState::clone(&guard);
        let out = change(&mut next)?;
        let next = Arc::new(next);
        check(&next)?;
        *guard = next;
        Ok(out)
    }

    /// Make a host class known to the engine.
    pub fn register_class(&self, info: ClassInfo) -> Result<(), AuthzError> {
        self.update(|state| state.registry.register(info))
    }

    /// Bind `name` to `value` for every rule and query. A variable with this
    /// name is replaced by the value wherever it appears. Registering the
    /// same name again replaces the value.
    pub fn register_constant(&self, name: &str, value: impl Into<Term>) -> Result<(), AuthzError> {
        let value = value.into();
        let invalid = |reason: &str| AuthzError::InvalidConstant {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let symbol = Symbol::new(name);
        if name.is_empty() || symbol.is_anonymous() || name.contains('#') {
            return Err(invalid("not a usable variable name"));
        }
        if !value.is_ground() {
            return Err(invalid("value must not contain variables"));
        }
        self.update(|state| {
            if let Term::ExternalInstance(instance) = &value {
                if !state.registry.contains(&instance.class) {
                    return Err(AuthzError::UnregisteredClass {
                        class: instance.class.clone(),
                    });
                }
            }
            state.constants.insert(symbol, value);
            Ok(())
        })?;
        tracing::info!(constant = name, "registered constant");
        Ok(())
    }

    /// Append rules. Either all of them are loaded or none are.
    pub fn load(&self, rules: impl IntoIterator<Item = Rule>) -> Result<usize, AuthzError> {
        let added = self.update(|state| state.kb.load(rules))?;
        tracing::info!(rules = added, "loaded rules");
        Ok(added)
    }

    /// Append a named policy source. Its inline queries run without host
    /// objects; use `load_source_with` when they need them.
    pub fn load_source(&self, source: PolicySource) -> Result<usize, AuthzError> {
        self.load_source_with(&NoHost, source)
    }

    /// Append a named policy source, checking its inline queries against
    /// `host`. If any query has no solution (or errors), nothing is loaded.
    pub fn load_source_with(&self, host: &dyn Host, source: PolicySource) -> Result<usize, AuthzError> {
        let name = source.name.clone();
        let queries = source.queries.clone();
        let max_steps = self.config.max_steps;
        self.update_checked(
            |state| state.kb.load_source(source),
            |candidate| {
                for query in &queries {
                    let mut resolver = Resolver::for_goals(Arc::clone(candidate), host, query, max_steps);
                    if resolver.next_solution()?.is_none() {
                        tracing::warn!(source = %name, query = %describe_query(query), "inline query failed");
                        return Err(AuthzError::InlineQueryFailed {
                            source_name: name.clone(),
                            query: describe_query(query),
                        });
                    }
                }
                Ok(())
            },
        )
    }

    /// Drop every rule, registered class and constant. Built-in classes remain.
    pub fn reset(&self) -> Result<(), AuthzError> {
        self.update(|state| {
            *state = EngineState::default();
            Ok(())
        })?;
        tracing::info!("authorizer reset");
        Ok(())
    }

    /// May `actor` perform `action` on `resource`?
    pub fn is_allowed(
        &self,
        host: &dyn Host,
        actor: impl Into<Term>,
        action: impl Into<Term>,
        resource: impl Into<Term>,
    ) -> Result<bool, AuthzError> {
        let args = vec![actor.into(), action.into(), resource.into()];
        let query = self.describe(&args);
        let mut resolver = self.resolver(host, &self.config.decision_rule, args)?;
        let allowed = resolver.next_solution()?.is_some();
        tracing::info!(
            query = %query,
            decision = if allowed { "allow" } else { "deny" },
            steps = resolver.steps(),
            "authorization decision"
        );
        Ok(allowed)
    }

    /// Every solution of `name(args...)`, produced lazily.
    ///
    /// Variables among `args` are reported in each `Solution`.
    pub fn query_rule<'h>(
        &self,
        host: &'h dyn Host,
        name: &str,
        args: Vec<Term>,
    ) -> Result<Solutions<'h>, AuthzError> {
        Ok(Solutions::new(self.resolver(host, name, args)?))
    }

    /// Like `is_allowed`, but returns a full trace of the evaluation.
    pub fn explain(
        &self,
        host: &dyn Host,
        actor: impl Into<Term>,
        action: impl Into<Term>,
        resource: impl Into<Term>,
    ) -> Result<DecisionTrace, AuthzError> {
        let args = vec![actor.into(), action.into(), resource.into()];
        let query = self.describe(&args);
        let mut resolver = self
            .resolver(host, &self.config.decision_rule, args)?
            .with_trace();
        let solution = resolver.next_solution()?;
        let allowed = solution.is_some();
        tracing::info!(
            query = %query,
            decision = if allowed { "allow" } else { "deny" },
            steps = resolver.steps(),
            "explained authorization decision"
        );
        Ok(DecisionTrace {
            query,
            allowed,
            steps: resolver.take_trace(),
            solution,
            evaluated_at: Utc::now(),
        })
    }

    pub fn rule_count(&self) -> Result<usize, AuthzError> {
        Ok(self.snapshot()?.kb.len())
    }

    /// Ordering groups and their sizes, sorted by name then arity.
    pub fn rule_keys(&self) -> Result<Vec<(RuleKey, usize)>, AuthzError> {
        Ok(self.snapshot()?.kb.keys())
    }

    fn resolver<'h>(
        &self,
        host: &'h dyn Host,
        name: &str,
        args: Vec<Term>,
    ) -> Result<Resolver<'h>, AuthzError> {
        Resolver::new(self.snapshot()?, host, name, args, self.config.max_steps)
    }

    fn describe(&self, args: &[Term]) -> String {
        let args: Vec<String> = args.iter().map(Term::to_string).collect();
        format!("{}({})", self.config.decision_rule, args.join(", "))
    }
}
