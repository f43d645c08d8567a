// builtins.rs — Methods on primitive values.
//
// Strings, numbers and lists are engine values rather than host objects, so
// their methods are implemented here. The method names must stay in sync
// with `BUILTIN_CLASSES` in registry.rs.

use crate::error::HostError;
use crate::term::{Term, Value};

/// Invoke `method` on a primitive receiver.
pub(crate) fn call(receiver: &Term, method: &str, args: &[Term]) -> Result<Term, HostError> {
    match receiver {
        Term::Atom(Value::String(s)) => string_method(s, method, args),
        Term::Atom(Value::Integer(i)) => match (method, args) {
            ("abs", []) => i
                .checked_abs()
                .map(Term::integer)
                .ok_or_else(|| HostError::Failed(format!("abs({}) overflows", i))),
            _ => Err(unknown("Integer", method)),
        },
        Term::Atom(Value::Float(x)) => match (method, args) {
            ("abs", []) => Ok(Term::float(x.abs())),
            _ => Err(unknown("Float", method)),
        },
        Term::Atom(Value::Boolean(_)) => Err(unknown("Boolean", method)),
        Term::List(items) => list_method(items, method, args),
        other => Err(HostError::NotAnObject(other.to_string())),
    }
}

fn string_method(s: &str, method: &str, args: &[Term]) -> Result<Term, HostError> {
    match method {
        "ends_with" => Ok(Term::boolean(s.ends_with(string_arg(method, args)?))),
        "starts_with" => Ok(Term::boolean(s.starts_with(string_arg(method, args)?))),
        "contains" => Ok(Term::boolean(s.contains(string_arg(method, args)?))),
        "split" => Ok(Term::list(
            s.split(string_arg(method, args)?).map(Term::string),
        )),
        "len" => no_args(method, args).map(|_| Term::integer(s.chars().count() as i64)),
        "to_lowercase" => no_args(method, args).map(|_| Term::string(s.to_lowercase())),
        "to_uppercase" => no_args(method, args).map(|_| Term::string(s.to_uppercase())),
        "trim" => no_args(method, args).map(|_| Term::string(s.trim())),
        _ => Err(unknown("String", method)),
    }
}

fn list_method(items: &[Term], method: &str, args: &[Term]) -> Result<Term, HostError> {
    match (method, args) {
        ("len", []) => Ok(Term::integer(items.len() as i64)),
        ("is_empty", []) => Ok(Term::boolean(items.is_empty())),
        ("contains", [needle]) => Ok(Term::boolean(items.iter().any(|t| t == needle))),
        ("len", _) | ("is_empty", _) | ("contains", _) => Err(HostError::BadArguments {
            method: method.to_string(),
            reason: format!("unexpected argument count {}", args.len()),
        }),
        _ => Err(unknown("List", method)),
    }
}

fn string_arg<'t>(method: &str, args: &'t [Term]) -> Result<&'t str, HostError> {
    match args {
        [Term::Atom(Value::String(s))] => Ok(s),
        _ => Err(HostError::BadArguments {
            method: method.to_string(),
            reason: "expected one string argument".to_string(),
        }),
    }
}

fn no_args(method: &str, args: &[Term]) -> Result<(), HostError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(HostError::BadArguments {
            method: method.to_string(),
            reason: "takes no arguments".to_string(),
        })
    }
}

fn unknown(class: &str, method: &str) -> HostError {
    HostError::UnknownMethod {
        class: class.to_string(),
        method: method.to_string(),
    }
}
