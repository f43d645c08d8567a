// term.rs — The values that flow through unification and resolution.
//
// A `Term` is either a variable, a primitive atom, a list, a pattern (class
// tag plus field constraints), or an opaque handle to an object owned by the
// host application. Rule parameters, goal operands, query arguments and
// query answers are all Terms.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A variable name.
///
/// The single underscore `_` is anonymous: every occurrence is renamed to a
/// distinct variable when a rule is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the anonymous variable `_`.
    pub fn is_anonymous(&self) -> bool {
        self.0 == "_"
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A primitive value.
///
/// Untagged so policy sources can write `"GET"`, `42`, `1.5` or `true`
/// directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Built-in class tag for this value.
    pub fn class_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
        }
    }

    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Integers and floats compare numerically, so `1 == 1.0`. The comparison
/// is exact: an integer never equals a float it merely rounds to.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (a, b) => a.numeric_cmp(b) == Some(Ordering::Equal),
        }
    }
}

impl Value {
    /// Order two numbers without losing precision. `None` if either side is
    /// not a number or a float is NaN.
    pub fn numeric_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(i), Value::Float(f)) => integer_float_cmp(*i, *f),
            (Value::Float(f), Value::Integer(i)) => integer_float_cmp(*i, *f).map(Ordering::reverse),
            _ => None,
        }
    }
}

/// Compare `i` with `f` exactly. Casting `i` to f64 would round above 2^53.
fn integer_float_cmp(i: i64, f: f64) -> Option<Ordering> {
    // 2^63, the first float past i64::MAX.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return None;
    }
    if f >= BOUND {
        return Some(Ordering::Less);
    }
    if f < -BOUND {
        return Some(Ordering::Greater);
    }
    // `f` is within i64 range here, so its integral part converts exactly.
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(f - whole)),
        unequal => Some(unequal),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// Opaque handle to a host-owned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A host object as seen by the engine: its handle and its class tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalInstance {
    pub id: InstanceId,
    pub class: String,
}

impl ExternalInstance {
    pub fn new(id: InstanceId, class: impl Into<String>) -> Self {
        Self {
            id,
            class: class.into(),
        }
    }
}

impl fmt::Display for ExternalInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.class, self.id)
    }
}

/// A shape constraint: an optional class tag plus field constraints.
///
/// Used as a rule parameter specializer (`expense: Expense{owner: actor}`)
/// and in `matches` goals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Term>,
}

impl Pattern {
    /// A pattern that only constrains the class.
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            class: Some(name.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field constraint.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Term>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(class) = &self.class {
            f.write_str(class)?;
        }
        if !self.fields.is_empty() || self.class.is_none() {
            f.write_str("{")?;
            for (i, (field, value)) in self.fields.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: {}", field, value)?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}

/// A value flowing through evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Variable(Symbol),
    Atom(Value),
    List(Vec<Term>),
    Pattern(Pattern),
    #[serde(rename = "instance")]
    ExternalInstance(ExternalInstance),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable(Symbol::new(name))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Term::Atom(Value::String(s.into()))
    }

    pub fn integer(i: i64) -> Self {
        Term::Atom(Value::Integer(i))
    }

    pub fn float(x: f64) -> Self {
        Term::Atom(Value::Float(x))
    }

    pub fn boolean(b: bool) -> Self {
        Term::Atom(Value::Boolean(b))
    }

    pub fn list(items: impl IntoIterator<Item = Term>) -> Self {
        Term::List(items.into_iter().collect())
    }

    pub fn as_variable(&self) -> Option<&Symbol> {
        match self {
            Term::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// True when the term contains no variables.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Variable(_) => false,
            Term::Atom(_) | Term::ExternalInstance(_) => true,
            Term::List(items) => items.iter().all(Term::is_ground),
            Term::Pattern(p) => p.fields.values().all(Term::is_ground),
        }
    }

    /// Collect the variables of this term, in first-occurrence order.
    pub fn variables(&self, out: &mut Vec<Symbol>) {
        match self {
            Term::Variable(v) => {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Term::Atom(_) | Term::ExternalInstance(_) => {}
            Term::List(items) => items.iter().for_each(|t| t.variables(out)),
            Term::Pattern(p) => p.fields.values().for_each(|t| t.variables(out)),
        }
    }

    /// Rebuild the term, replacing every variable with `f(variable)`.
    pub fn map_variables(&self, f: &mut impl FnMut(&Symbol) -> Term) -> Term {
        match self {
            Term::Variable(v) => f(v),
            Term::Atom(_) | Term::ExternalInstance(_) => self.clone(),
            Term::List(items) => Term::List(items.iter().map(|t| t.map_variables(f)).collect()),
            Term::Pattern(p) => Term::Pattern(p.map_variables(f)),
        }
    }
}

impl Pattern {
    pub(crate) fn map_variables(&self, f: &mut impl FnMut(&Symbol) -> Term) -> Pattern {
        Pattern {
            class: self.class.clone(),
            fields: self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.map_variables(f)))
                .collect(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(v) => write!(f, "{}", v),
            Term::Atom(a) => write!(f, "{}", a),
            Term::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Term::Pattern(p) => write!(f, "{}", p),
            Term::ExternalInstance(e) => write!(f, "{}", e),
        }
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::string(s)
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::string(s)
    }
}

impl From<i64> for Term {
    fn from(i: i64) -> Self {
        Term::integer(i)
    }
}

impl From<f64> for Term {
    fn from(x: f64) -> Self {
        Term::float(x)
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::boolean(b)
    }
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Term::Atom(v)
    }
}

impl From<ExternalInstance> for Term {
    fn from(e: ExternalInstance) -> Self {
        Term::ExternalInstance(e)
    }
}

impl From<Pattern> for Term {
    fn from(p: Pattern) -> Self {
        Term::Pattern(p)
    }
}

impl From<Vec<Term>> for Term {
    fn from(items: Vec<Term>) -> Self {
        Term::List(items)
    }
}
