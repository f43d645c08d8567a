// unify.rs — Structural equality with variable binding.
//
// `unify` either succeeds, leaving new bindings in place, or fails and
// leaves the environment exactly as it found it. Host instances are never
// inspected structurally; they compare through the host bridge.

use thiserror::Error;

use crate::bindings::Bindings;
use crate::host::HostBridge;
use crate::term::Term;

/// Two terms could not be made equal. Drives backtracking; never surfaced
/// to callers of the decision API.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot unify {left} with {right}")]
pub struct UnificationError {
    pub left: String,
    pub right: String,
}

/// Unify `left` with `right`, extending `bindings` on success.
pub fn unify(
    left: &Term,
    right: &Term,
    bindings: &mut Bindings,
    bridge: &HostBridge<'_>,
) -> Result<(), UnificationError> {
    let mark = bindings.snapshot();
    if unify_inner(left, right, bindings, bridge) {
        Ok(())
    } else {
        bindings.restore(mark);
        Err(UnificationError {
            left: bindings.resolve(left).to_string(),
            right: bindings.resolve(right).to_string(),
        })
    }
}

fn unify_inner(left: &Term, right: &Term, bindings: &mut Bindings, bridge: &HostBridge<'_>) -> bool {
    let left = bindings.walk(left);
    let right = bindings.walk(right);
    match (&left, &right) {
        (Term::Variable(a), Term::Variable(b)) if a == b => true,
        (Term::Variable(var), other) | (other, Term::Variable(var)) => {
            if bindings.occurs(var, other) {
                return false;
            }
            bindings.bind(var, other.clone());
            true
        }
        (Term::Atom(a), Term::Atom(b)) => a == b,
        (Term::List(a), Term::List(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| unify_inner(x, y, bindings, bridge))
        }
        (Term::Pattern(a), Term::Pattern(b)) => {
            a.class == b.class
                && a.fields.len() == b.fields.len()
                && a.fields.iter().all(|(field, x)| match b.fields.get(field) {
                    Some(y) => unify_inner(x, y, bindings, bridge),
                    None => false,
                })
        }
        (Term::ExternalInstance(a), Term::ExternalInstance(b)) => match bridge.equals(a, b) {
            Ok(equal) => equal,
            Err(err) => {
                tracing::debug!(left = %a, right = %b, error = %err, "host equality failed");
                false
            }
        },
        _ => false,
    }
}
