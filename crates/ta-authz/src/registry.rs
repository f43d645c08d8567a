// registry.rs — Class registry: class tags, superclass chains, members.
//
// The embedding application registers every class whose instances it will
// pass into queries. Specializer matching walks the superclass chain kept
// here, and the host bridge refuses member accesses that the class (or one
// of its ancestors) does not declare.
//
// Built-in classes for primitive values are always present, including
// right after a reset.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AuthzError;

/// What kind of member a descriptor names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Field,
    Method,
}

/// A member the host exposes to policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
}

/// Metadata for one registered class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberDescriptor>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            members: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.members.push(MemberDescriptor {
            name: name.into(),
            kind: MemberKind::Field,
        });
        self
    }

    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.members.push(MemberDescriptor {
            name: name.into(),
            kind: MemberKind::Method,
        });
        self
    }

    fn declares(&self, name: &str, kind: MemberKind) -> bool {
        self.members.iter().any(|m| m.name == name && m.kind == kind)
    }
}

/// Built-in classes and the methods `builtins.rs` implements for them.
const BUILTIN_CLASSES: &[(&str, &[&str])] = &[
    ("Boolean", &[]),
    ("Integer", &["abs"]),
    ("Float", &["abs"]),
    (
        "String",
        &[
            "ends_with",
            "starts_with",
            "contains",
            "len",
            "to_lowercase",
            "to_uppercase",
            "trim",
            "split",
        ],
    ),
    ("List", &["len", "contains", "is_empty"]),
];

/// Class tag → metadata.
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    classes: HashMap<String, ClassInfo>,
}

impl ClassRegistry {
    /// A registry holding only the built-in classes.
    pub fn new() -> Self {
        let mut classes = HashMap::new();
        for (name, methods) in BUILTIN_CLASSES {
            let info = methods
                .iter()
                .fold(ClassInfo::new(*name), |info, m| info.method(*m));
            classes.insert(name.to_string(), info);
        }
        Self { classes }
    }

    /// Register a class. The superclass, if any, must already be registered.
    pub fn register(&mut self, info: ClassInfo) -> Result<(), AuthzError> {
        if self.classes.contains_key(&info.name) {
            return Err(AuthzError::DuplicateClass { class: info.name });
        }
        if let Some(parent) = &info.superclass {
            if !self.classes.contains_key(parent) {
                return Err(AuthzError::UnregisteredClass {
                    class: parent.clone(),
                });
            }
        }
        tracing::debug!(class = %info.name, superclass = ?info.superclass, "registered class");
        self.classes.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn is_builtin(name: &str) -> bool {
        BUILTIN_CLASSES.iter().any(|(n, _)| *n == name)
    }

    /// Number of registered classes, built-ins included.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The class followed by its ancestors, nearest first.
    ///
    /// Unknown classes yield an empty chain. Registration order guarantees
    /// the chain is finite.
    pub fn ancestry(&self, name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.classes.get(name);
        while let Some(info) = current {
            chain.push(info.name.as_str());
            current = info.superclass.as_deref().and_then(|p| self.classes.get(p));
        }
        chain
    }

    /// Reflexive subclass check along the superclass chain.
    pub fn is_subclass(&self, child: &str, parent: &str) -> bool {
        self.ancestry(child).contains(&parent)
    }

    /// True if `class` or one of its ancestors declares the member.
    pub fn declares(&self, class: &str, member: &str, kind: MemberKind) -> bool {
        self.ancestry(class)
            .iter()
            .filter_map(|c| self.classes.get(*c))
            .any(|info| info.declares(member, kind))
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
