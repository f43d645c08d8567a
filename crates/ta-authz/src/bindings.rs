// bindings.rs — Binding environment for one resolution branch.
//
// Bindings live in a map keyed by variable name, with a trail recording the
// order in which variables were bound. A choice point remembers the trail
// length (`snapshot`) and `restore` unbinds everything bound after it, so a
// failed branch never leaks bindings into its alternatives.

use std::collections::HashMap;

use crate::term::{Symbol, Term};

/// Variable → Term bindings with trail-based undo.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: HashMap<Symbol, Term>,
    trail: Vec<Symbol>,
}

/// Opaque trail position returned by [`Bindings::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an unbound variable. Rebinding is a logic error in the caller.
    pub fn bind(&mut self, var: &Symbol, value: Term) {
        debug_assert!(!self.map.contains_key(var), "rebinding {}", var);
        self.map.insert(var.clone(), value);
        self.trail.push(var.clone());
    }

    pub fn get(&self, var: &Symbol) -> Option<&Term> {
        self.map.get(var)
    }

    pub fn is_bound(&self, var: &Symbol) -> bool {
        self.map.contains_key(var)
    }

    pub fn len(&self) -> usize {
        self.trail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trail.is_empty()
    }

    pub fn snapshot(&self) -> Mark {
        Mark(self.trail.len())
    }

    /// Undo every binding made after `mark`.
    pub fn restore(&mut self, mark: Mark) {
        while self.trail.len() > mark.0 {
            if let Some(var) = self.trail.pop() {
                self.map.remove(&var);
            }
        }
    }

    /// Follow variable chains until reaching an unbound variable or a
    /// non-variable term. Does not descend into compound terms.
    pub fn walk(&self, term: &Term) -> Term {
        let mut current = term;
        while let Term::Variable(v) = current {
            match self.map.get(v) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.clone()
    }

    /// Fully substitute bindings throughout a term.
    pub fn resolve(&self, term: &Term) -> Term {
        match self.walk(term) {
            Term::List(items) => Term::List(items.iter().map(|t| self.resolve(t)).collect()),
            Term::Pattern(p) => Term::Pattern(p.map_variables(&mut |v| {
                self.resolve(&Term::Variable(v.clone()))
            })),
            other => other,
        }
    }

    /// True if `var` occurs anywhere inside `term` after substitution.
    pub fn occurs(&self, var: &Symbol, term: &Term) -> bool {
        match self.walk(term) {
            Term::Variable(v) => &v == var,
            Term::List(items) => items.iter().any(|t| self.occurs(var, t)),
            Term::Pattern(p) => p.fields.values().any(|t| self.occurs(var, t)),
            Term::Atom(_) | Term::ExternalInstance(_) => false,
        }
    }
}
