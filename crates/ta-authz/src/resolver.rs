// resolver.rs — Depth-first proof search with backtracking.
//
// The resolver keeps its state in two explicit stacks instead of the native
// call stack:
//
// - `goals`: the pending conjunction, top of stack = next goal to run.
// - `choices`: choice points. Each holds the untried alternatives (goal
//   lists), the goal stack as it was when the choice was made, and the
//   trail mark to restore bindings to.
//
// A solution is reached when the goal stack empties. Asking for the next
// solution backtracks into the newest choice point, so enumeration is lazy
// and resumable, and recursion depth in the policy never grows the native
// stack.
//
// Every rule application renames the rule's variables apart (`name#N`);
// `_` gets a fresh variable per occurrence. A variable named after a
// registered constant is replaced by the constant's value instead.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::authorizer::EngineState;
use crate::bindings::{Bindings, Mark};
use crate::error::AuthzError;
use crate::host::{Host, HostBridge};
use crate::rule::{ArithOp, CompareOp, Goal, Rule};
use crate::specializer::{class_matches, field_goals, order_rules};
use crate::term::{Symbol, Term, Value};
use crate::unify::unify;

/// Bindings of the query's named variables for one successful proof.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Solution {
    bindings: BTreeMap<String, Term>,
}

impl Solution {
    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

struct ChoicePoint {
    /// Remaining alternatives, last element tried next.
    alternatives: Vec<Vec<Goal>>,
    goals: Vec<Goal>,
    mark: Mark,
}

/// Fresh-variable renaming for one rule application.
struct Renamer<'c> {
    next: &'c mut u64,
    constants: &'c BTreeMap<Symbol, Term>,
    names: HashMap<Symbol, Term>,
}

impl<'c> Renamer<'c> {
    fn new(next: &'c mut u64, constants: &'c BTreeMap<Symbol, Term>) -> Self {
        Self {
            next,
            constants,
            names: HashMap::new(),
        }
    }

    fn rename(&mut self, var: &Symbol) -> Term {
        if var.is_anonymous() {
            return fresh_variable(self.next, var);
        }
        if let Some(value) = self.constants.get(var) {
            return value.clone();
        }
        if let Some(term) = self.names.get(var) {
            return term.clone();
        }
        let term = fresh_variable(self.next, var);
        self.names.insert(var.clone(), term.clone());
        term
    }
}

fn fresh_variable(next: &mut u64, var: &Symbol) -> Term {
    *next += 1;
    Term::var(format!("{}#{}", var, next))
}

/// One query's proof search.
pub struct Resolver<'h> {
    state: Arc<EngineState>,
    host: &'h dyn Host,
    goals: Vec<Goal>,
    choices: Vec<ChoicePoint>,
    bindings: Bindings,
    query_vars: Vec<Symbol>,
    fresh: u64,
    steps: usize,
    max_steps: Option<usize>,
    done: bool,
    yielded: bool,
    trace: Option<Vec<String>>,
}

impl<'h> Resolver<'h> {
    /// Prepare the query `name(args...)`.
    ///
    /// A predicate with no rules at all yields no solutions (deny by
    /// default). Arguments holding instances of unregistered classes are
    /// rejected up front.
    pub fn new(
        state: Arc<EngineState>,
        host: &'h dyn Host,
        name: &str,
        args: Vec<Term>,
        max_steps: Option<usize>,
    ) -> Result<Self, AuthzError> {
        let bridge = HostBridge::new(&state.registry, host);
        for arg in &args {
            check_instances(arg, &bridge)?;
        }

        let mut query_vars = Vec::new();
        for arg in &args {
            arg.variables(&mut query_vars);
        }
        query_vars.retain(|v| !v.is_anonymous() && !state.constants.contains_key(v));

        let mut fresh = 0;
        let args: Vec<Term> = args
            .iter()
            .map(|arg| {
                arg.map_variables(&mut |v| {
                    if v.is_anonymous() {
                        fresh_variable(&mut fresh, v)
                    } else if let Some(value) = state.constants.get(v) {
                        value.clone()
                    } else {
                        Term::Variable(v.clone())
                    }
                })
            })
            .collect();

        let done = !state.kb.contains(name, args.len());
        if done {
            tracing::debug!(predicate = name, arity = args.len(), "no rules for query predicate");
        }
        let goals = if done {
            Vec::new()
        } else {
            vec![Goal::call(name, args)]
        };

        Ok(Self {
            state,
            host,
            goals,
            choices: Vec::new(),
            bindings: Bindings::new(),
            query_vars,
            fresh,
            steps: 0,
            max_steps,
            done,
            yielded: false,
            trace: None,
        })
    }

    /// Prepare a bare conjunction, such as an inline query from a policy
    /// source. Its variables are renamed apart and not reported.
    pub(crate) fn for_goals(
        state: Arc<EngineState>,
        host: &'h dyn Host,
        goals: &[Goal],
        max_steps: Option<usize>,
    ) -> Self {
        let mut fresh = 0;
        let conjunction: Vec<Goal> = {
            let mut renamer = Renamer::new(&mut fresh, &state.constants);
            goals.iter().map(|g| g.map_variables(&mut |v| renamer.rename(v))).collect()
        };
        let mut stack = Vec::with_capacity(conjunction.len());
        push_conjunction(&mut stack, conjunction);
        Self {
            state,
            host,
            goals: stack,
            choices: Vec::new(),
            bindings: Bindings::new(),
            query_vars: Vec::new(),
            fresh,
            steps: 0,
            max_steps,
            done: false,
            yielded: false,
            trace: None,
        }
    }

    /// Record every executed goal, with bindings applied, for `take_trace`.
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    /// Goals executed so far, across all solutions.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn take_trace(&mut self) -> Vec<String> {
        self.trace.take().unwrap_or_default()
    }

    /// Run until the next solution. `Ok(None)` once the search space is
    /// exhausted. After an error the resolver stays exhausted.
    pub fn next_solution(&mut self) -> Result<Option<Solution>, AuthzError> {
        if self.done {
            return Ok(None);
        }
        if self.yielded {
            self.yielded = false;
            if !self.backtrack() {
                self.done = true;
                return Ok(None);
            }
        }
        match self.run() {
            Ok(true) => {
                self.yielded = true;
                Ok(Some(self.solution()))
            }
            Ok(false) => {
                self.done = true;
                Ok(None)
            }
            Err(err) => {
                self.done = true;
                Err(err)
            }
        }
    }

    /// Execute goals until the stack empties (true) or no choice is left
    /// (false).
    fn run(&mut self) -> Result<bool, AuthzError> {
        while let Some(goal) = self.goals.pop() {
            self.count_step()?;
            if let Some(trace) = self.trace.as_mut() {
                let bindings = &self.bindings;
                let resolved = goal.map_variables(&mut |v| bindings.resolve(&Term::Variable(v.clone())));
                trace.push(resolved.to_string());
            }
            tracing::trace!(goal = %goal, choices = self.choices.len(), "execute");
            if !self.execute(goal)? && !self.backtrack() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn count_step(&mut self) -> Result<(), AuthzError> {
        self.steps += 1;
        match self.max_steps {
            Some(limit) if self.steps > limit => Err(AuthzError::StepLimitExceeded { limit }),
            _ => Ok(()),
        }
    }

    /// Run one goal. `Ok(false)` means the goal failed.
    fn execute(&mut self, goal: Goal) -> Result<bool, AuthzError> {
        let state = Arc::clone(&self.state);
        let bridge = HostBridge::new(&state.registry, self.host);
        match goal {
            Goal::Call { name, args } => {
                let rules = state.kb.rules_for(&name, args.len());
                if rules.is_empty() {
                    return Err(AuthzError::UnknownRule {
                        arity: args.len(),
                        name,
                    });
                }
                let ordered = order_rules(rules, &args, &self.bindings, &bridge)?;
                tracing::debug!(
                    predicate = %name,
                    arity = args.len(),
                    candidates = rules.len(),
                    applicable = ordered.len(),
                    "selected rules"
                );
                let alternatives = ordered
                    .iter()
                    .map(|rule| self.instantiate(rule, &args))
                    .collect();
                Ok(self.branch(alternatives))
            }
            Goal::Unify { left, right } => Ok(unify(&left, &right, &mut self.bindings, &bridge).is_ok()),
            Goal::Compare { op, left, right } => {
                let left = self.bindings.resolve(&left);
                let right = self.bindings.resolve(&right);
                Ok(compare(op, &left, &right, &bridge))
            }
            Goal::Arithmetic {
                op,
                left,
                right,
                result,
            } => {
                let left = self.bindings.resolve(&left);
                let right = self.bindings.resolve(&right);
                match arithmetic(op, &left, &right) {
                    Some(value) => Ok(unify(&value, &result, &mut self.bindings, &bridge).is_ok()),
                    None => {
                        tracing::debug!(left = %left, right = %right, "arithmetic undefined");
                        Ok(false)
                    }
                }
            }
            Goal::Lookup {
                receiver,
                field,
                result,
            } => {
                let receiver = self.bindings.walk(&receiver);
                if receiver.as_variable().is_some() {
                    return Ok(false);
                }
                match host_result(bridge.get_field(&receiver, &field))? {
                    Some(value) => Ok(unify(&value, &result, &mut self.bindings, &bridge).is_ok()),
                    None => Ok(false),
                }
            }
            Goal::Invoke {
                receiver,
                method,
                args,
                result,
            } => {
                let receiver = self.bindings.resolve(&receiver);
                if receiver.as_variable().is_some() {
                    return Ok(false);
                }
                let args: Vec<Term> = args.iter().map(|a| self.bindings.resolve(a)).collect();
                match host_result(bridge.call_method(&receiver, &method, &args))? {
                    Some(value) => Ok(unify(&value, &result, &mut self.bindings, &bridge).is_ok()),
                    None => Ok(false),
                }
            }
            Goal::Matches { term, pattern } => {
                let value = self.bindings.walk(&term);
                if !class_matches(&value, &pattern, &self.bindings, &bridge)? {
                    return Ok(false);
                }
                push_conjunction(&mut self.goals, field_goals(&value, &pattern));
                Ok(true)
            }
            Goal::Not { goals } => {
                let mut nested = self.nested(goals);
                let proved = nested.next_solution()?.is_some();
                self.steps = nested.steps;
                self.fresh = nested.fresh;
                Ok(!proved)
            }
            Goal::Any { branches } => Ok(self.branch(branches)),
        }
    }

    /// Head unification, specializer field constraints, then the body, for
    /// a freshly renamed copy of `rule`.
    fn instantiate(&mut self, rule: &Rule, args: &[Term]) -> Vec<Goal> {
        let state = Arc::clone(&self.state);
        let mut renamer = Renamer::new(&mut self.fresh, &state.constants);
        let mut head = Vec::with_capacity(rule.params.len());
        let mut constraints = Vec::new();
        for (param, arg) in rule.params.iter().zip(args) {
            let term = param.term.map_variables(&mut |v| renamer.rename(v));
            if let Some(pattern) = &param.specializer {
                let pattern = pattern.map_variables(&mut |v| renamer.rename(v));
                constraints.extend(field_goals(&term, &pattern));
            }
            head.push(Goal::Unify {
                left: arg.clone(),
                right: term,
            });
        }
        head.extend(constraints);
        head.extend(rule.body.iter().map(|g| g.map_variables(&mut |v| renamer.rename(v))));
        head
    }

    /// Push a choice point over `alternatives` and enter the first one.
    fn branch(&mut self, mut alternatives: Vec<Vec<Goal>>) -> bool {
        if alternatives.is_empty() {
            return false;
        }
        alternatives.reverse();
        self.choices.push(ChoicePoint {
            alternatives,
            goals: std::mem::take(&mut self.goals),
            mark: self.bindings.snapshot(),
        });
        self.backtrack()
    }

    /// Resume the newest choice point with an untried alternative.
    fn backtrack(&mut self) -> bool {
        while let Some(mut choice) = self.choices.pop() {
            self.bindings.restore(choice.mark);
            let Some(alternative) = choice.alternatives.pop() else {
                continue;
            };
            let mut goals = if choice.alternatives.is_empty() {
                choice.goals
            } else {
                let goals = choice.goals.clone();
                self.choices.push(choice);
                goals
            };
            push_conjunction(&mut goals, alternative);
            self.goals = goals;
            return true;
        }
        false
    }

    /// A sub-search over a copy of the current bindings, sharing the step
    /// budget and fresh-variable counter.
    fn nested(&self, goals: Vec<Goal>) -> Resolver<'h> {
        let mut stack = Vec::with_capacity(goals.len());
        push_conjunction(&mut stack, goals);
        Resolver {
            state: Arc::clone(&self.state),
            host: self.host,
            goals: stack,
            choices: Vec::new(),
            bindings: self.bindings.clone(),
            query_vars: Vec::new(),
            fresh: self.fresh,
            steps: self.steps,
            max_steps: self.max_steps,
            done: false,
            yielded: false,
            trace: None,
        }
    }

    /// Resolved values of the query variables. Variables left unbound are
    /// reported under the first query variable they alias, or as `_`, so
    /// renamed internals (`x#3`) never appear in an answer.
    fn solution(&self) -> Solution {
        let mut aliases: HashMap<Symbol, Symbol> = HashMap::new();
        for var in &self.query_vars {
            if let Term::Variable(root) = self.bindings.walk(&Term::Variable(var.clone())) {
                aliases.entry(root).or_insert_with(|| var.clone());
            }
        }
        let bindings = self
            .query_vars
            .iter()
            .map(|v| {
                let value = self
                    .bindings
                    .resolve(&Term::Variable(v.clone()))
                    .map_variables(&mut |free| match aliases.get(free) {
                        Some(name) => Term::Variable(name.clone()),
                        None => Term::var("_"),
                    });
                (v.to_string(), value)
            })
            .collect();
        Solution { bindings }
    }
}

/// Lazy stream of solutions for one query.
pub struct Solutions<'h> {
    resolver: Resolver<'h>,
}

impl<'h> Solutions<'h> {
    pub(crate) fn new(resolver: Resolver<'h>) -> Self {
        Self { resolver }
    }

    /// Goals executed so far.
    pub fn steps(&self) -> usize {
        self.resolver.steps()
    }
}

impl Iterator for Solutions<'_> {
    type Item = Result<Solution, AuthzError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.resolver.next_solution().transpose()
    }
}

/// Push a conjunction so that its first goal runs next.
fn push_conjunction(stack: &mut Vec<Goal>, goals: Vec<Goal>) {
    stack.extend(goals.into_iter().rev());
}

/// Host failures become goal failure; configuration errors propagate.
fn host_result(result: Result<Term, AuthzError>) -> Result<Option<Term>, AuthzError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(AuthzError::Host(err)) => {
            tracing::debug!(error = %err, "host access failed; backtracking");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn check_instances(term: &Term, bridge: &HostBridge<'_>) -> Result<(), AuthzError> {
    match term {
        Term::ExternalInstance(_) => bridge.class_of(term).map(|_| ()),
        Term::List(items) => items.iter().try_for_each(|t| check_instances(t, bridge)),
        Term::Pattern(p) => p.fields.values().try_for_each(|t| check_instances(t, bridge)),
        Term::Variable(_) | Term::Atom(_) => Ok(()),
    }
}

fn compare(op: CompareOp, left: &Term, right: &Term, bridge: &HostBridge<'_>) -> bool {
    if !left.is_ground() || !right.is_ground() {
        return false;
    }
    match op {
        CompareOp::Eq => return ground_equal(left, right, bridge),
        CompareOp::Neq => return !ground_equal(left, right, bridge),
        _ => {}
    }
    let ordering = match (left, right) {
        (Term::Atom(a), Term::Atom(b)) => order_values(a, b),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Leq => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Geq => ordering.is_ge(),
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Neq => ordering.is_ne(),
    }
}

/// Equality of ground terms: unification that has nothing to bind.
fn ground_equal(left: &Term, right: &Term, bridge: &HostBridge<'_>) -> bool {
    unify(left, right, &mut Bindings::new(), bridge).is_ok()
}

fn order_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => a.numeric_cmp(b),
    }
}

/// Integer arithmetic stays integral and fails on overflow; any float
/// operand makes the result a float. Division or modulo by zero is
/// undefined.
fn arithmetic(op: ArithOp, left: &Term, right: &Term) -> Option<Term> {
    let (Term::Atom(l), Term::Atom(r)) = (left, right) else {
        return None;
    };
    if let (Value::Integer(a), Value::Integer(b)) = (l, r) {
        let (a, b) = (*a, *b);
        let value = match op {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Div => a.checked_div(b),
            ArithOp::Mod => a.checked_rem_euclid(b),
        };
        return value.map(Term::integer);
    }
    let (a, b) = (l.as_f64()?, r.as_f64()?);
    let value = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div | ArithOp::Mod if b == 0.0 => return None,
        ArithOp::Div => a / b,
        ArithOp::Mod => a.rem_euclid(b),
    };
    Some(Term::float(value))
}
