// rule.rs — Rule definitions as the engine evaluates them.
//
// A rule is a head (name + parameters, each optionally specialized by a
// Pattern) and a body: a conjunction of goals. Policy text parsing lives
// outside this crate; rules arrive either built in Rust with the helpers
// below or deserialized from a JSON `PolicySource`.
//
// Example — `allow(actor, "GET", expense: Expense) if actor = expense.submitted_by`:
//
// ```rust
// use ta_authz::{Goal, Pattern, Rule, Term};
//
// let rule = Rule::new("allow")
//     .param(Term::var("actor"))
//     .param("GET")
//     .specialized(Term::var("expense"), Pattern::class("Expense"))
//     .goal(Goal::lookup(Term::var("expense"), "submitted_by", Term::var("actor")));
// assert_eq!(rule.arity(), 3);
// ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::term::{Pattern, Symbol, Term};

/// One rule parameter: the term matched against the argument, plus an
/// optional specializer used for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub term: Term,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specializer: Option<Pattern>,
}

impl Parameter {
    pub fn new(term: impl Into<Term>) -> Self {
        Self {
            term: term.into(),
            specializer: None,
        }
    }
}

/// Comparison operators for `Compare` goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Leq => "<=",
            CompareOp::Gt => ">",
            CompareOp::Geq => ">=",
        }
    }
}

/// Arithmetic operators for `Arithmetic` goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "mod",
        }
    }
}

/// A single goal in a rule body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "goal", rename_all = "snake_case")]
pub enum Goal {
    /// Invoke the rules named `name` with `args.len()` parameters.
    Call { name: String, args: Vec<Term> },
    /// `left = right`
    Unify { left: Term, right: Term },
    /// `left <op> right` on bound terms; never binds.
    Compare {
        op: CompareOp,
        left: Term,
        right: Term,
    },
    /// `result = left <op> right`
    Arithmetic {
        op: ArithOp,
        left: Term,
        right: Term,
        result: Term,
    },
    /// `result = receiver.field`
    Lookup {
        receiver: Term,
        field: String,
        result: Term,
    },
    /// `result = receiver.method(args...)`
    Invoke {
        receiver: Term,
        method: String,
        #[serde(default)]
        args: Vec<Term>,
        result: Term,
    },
    /// `term matches Pattern`
    Matches { term: Term, pattern: Pattern },
    /// Succeeds only if the conjunction has no solution. Binds nothing.
    Not { goals: Vec<Goal> },
    /// Disjunction; each branch is a conjunction, tried in order.
    Any { branches: Vec<Vec<Goal>> },
}

impl Goal {
    pub fn call(name: impl Into<String>, args: Vec<Term>) -> Self {
        Goal::Call {
            name: name.into(),
            args,
        }
    }

    pub fn unify(left: impl Into<Term>, right: impl Into<Term>) -> Self {
        Goal::Unify {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn compare(op: CompareOp, left: impl Into<Term>, right: impl Into<Term>) -> Self {
        Goal::Compare {
            op,
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn arithmetic(
        op: ArithOp,
        left: impl Into<Term>,
        right: impl Into<Term>,
        result: impl Into<Term>,
    ) -> Self {
        Goal::Arithmetic {
            op,
            left: left.into(),
            right: right.into(),
            result: result.into(),
        }
    }

    pub fn lookup(receiver: impl Into<Term>, field: impl Into<String>, result: impl Into<Term>) -> Self {
        Goal::Lookup {
            receiver: receiver.into(),
            field: field.into(),
            result: result.into(),
        }
    }

    pub fn invoke(
        receiver: impl Into<Term>,
        method: impl Into<String>,
        args: Vec<Term>,
        result: impl Into<Term>,
    ) -> Self {
        Goal::Invoke {
            receiver: receiver.into(),
            method: method.into(),
            args,
            result: result.into(),
        }
    }

    /// Method call used as a condition: the method must return `true`.
    pub fn check(receiver: impl Into<Term>, method: impl Into<String>, args: Vec<Term>) -> Self {
        Self::invoke(receiver, method, args, Term::boolean(true))
    }

    pub fn matches(term: impl Into<Term>, pattern: Pattern) -> Self {
        Goal::Matches {
            term: term.into(),
            pattern,
        }
    }

    pub fn negation(goals: Vec<Goal>) -> Self {
        Goal::Not { goals }
    }

    pub fn any(branches: Vec<Vec<Goal>>) -> Self {
        Goal::Any { branches }
    }

    /// Rebuild the goal with every variable replaced by `f(variable)`.
    pub fn map_variables(&self, f: &mut impl FnMut(&Symbol) -> Term) -> Goal {
        match self {
            Goal::Call { name, args } => Goal::Call {
                name: name.clone(),
                args: args.iter().map(|t| t.map_variables(f)).collect(),
            },
            Goal::Unify { left, right } => Goal::Unify {
                left: left.map_variables(f),
                right: right.map_variables(f),
            },
            Goal::Compare { op, left, right } => Goal::Compare {
                op: *op,
                left: left.map_variables(f),
                right: right.map_variables(f),
            },
            Goal::Arithmetic {
                op,
                left,
                right,
                result,
            } => Goal::Arithmetic {
                op: *op,
                left: left.map_variables(f),
                right: right.map_variables(f),
                result: result.map_variables(f),
            },
            Goal::Lookup {
                receiver,
                field,
                result,
            } => Goal::Lookup {
                receiver: receiver.map_variables(f),
                field: field.clone(),
                result: result.map_variables(f),
            },
            Goal::Invoke {
                receiver,
                method,
                args,
                result,
            } => Goal::Invoke {
                receiver: receiver.map_variables(f),
                method: method.clone(),
                args: args.iter().map(|t| t.map_variables(f)).collect(),
                result: result.map_variables(f),
            },
            Goal::Matches { term, pattern } => Goal::Matches {
                term: term.map_variables(f),
                pattern: pattern.map_variables(f),
            },
            Goal::Not { goals } => Goal::Not {
                goals: goals.iter().map(|g| g.map_variables(f)).collect(),
            },
            Goal::Any { branches } => Goal::Any {
                branches: branches
                    .iter()
                    .map(|b| b.iter().map(|g| g.map_variables(f)).collect())
                    .collect(),
            },
        }
    }
}

/// Render an inline query as policy text, e.g. `?= role("alice", "admin")`.
pub fn describe_query(goals: &[Goal]) -> String {
    struct Query<'a>(&'a [Goal]);
    impl fmt::Display for Query<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("?= ")?;
            write_conjunction(f, self.0)
        }
    }
    Query(goals).to_string()
}

fn write_conjunction(f: &mut fmt::Formatter<'_>, goals: &[Goal]) -> fmt::Result {
    for (i, goal) in goals.iter().enumerate() {
        if i > 0 {
            f.write_str(" and ")?;
        }
        write!(f, "{}", goal)?;
    }
    Ok(())
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Term]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Call { name, args } => {
                write!(f, "{}(", name)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Goal::Unify { left, right } => write!(f, "{} = {}", left, right),
            Goal::Compare { op, left, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Goal::Arithmetic {
                op,
                left,
                right,
                result,
            } => write!(f, "{} = {} {} {}", result, left, op.symbol(), right),
            Goal::Lookup {
                receiver,
                field,
                result,
            } => write!(f, "{} = {}.{}", result, receiver, field),
            Goal::Invoke {
                receiver,
                method,
                args,
                result,
            } => {
                if *result != Term::boolean(true) {
                    write!(f, "{} = ", result)?;
                }
                write!(f, "{}.{}(", receiver, method)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Goal::Matches { term, pattern } => write!(f, "{} matches {}", term, pattern),
            Goal::Not { goals } => {
                f.write_str("not (")?;
                write_conjunction(f, goals)?;
                f.write_str(")")
            }
            Goal::Any { branches } => {
                f.write_str("(")?;
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write_conjunction(f, branch)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A loaded rule. Immutable once in the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Parameter>,
    #[serde(default)]
    pub body: Vec<Goal>,
    /// Name of the source unit the rule was loaded from, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            body: Vec::new(),
            source: None,
        }
    }

    /// Append an unspecialized parameter.
    pub fn param(mut self, term: impl Into<Term>) -> Self {
        self.params.push(Parameter::new(term));
        self
    }

    /// Append a parameter with a specializer.
    pub fn specialized(mut self, term: impl Into<Term>, pattern: Pattern) -> Self {
        self.params.push(Parameter {
            term: term.into(),
            specializer: Some(pattern),
        });
        self
    }

    /// Append a goal to the body.
    pub fn goal(mut self, goal: Goal) -> Self {
        self.body.push(goal);
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// True if any parameter carries a specializer.
    pub fn is_specialized(&self) -> bool {
        self.params.iter().any(|p| p.specializer.is_some())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param.term)?;
            if let Some(spec) = &param.specializer {
                write!(f, ": {}", spec)?;
            }
        }
        f.write_str(")")?;
        if !self.body.is_empty() {
            f.write_str(" if ")?;
            write_conjunction(f, &self.body)?;
        }
        Ok(())
    }
}

/// A named unit of rules loaded together (one policy file).
///
/// `queries` are inline assertions (`?= goal and goal`). Each must have at
/// least one solution once the source's rules are in place, or the whole
/// load is rejected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicySource {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<Vec<Goal>>,
}

impl PolicySource {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
            queries: Vec::new(),
        }
    }

    pub fn with_query(mut self, goals: Vec<Goal>) -> Self {
        self.queries.push(goals);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
