// host.rs — The seam between the engine and the embedding application.
//
// The application implements `Host` for whatever owns its objects. The
// engine never calls it directly: all access goes through `HostBridge`,
// which pairs the host with the class registry so that
//
// - members the class does not declare are refused before reaching the host,
// - primitive receivers (strings, numbers, lists) dispatch to built-ins,
// - unregistered classes surface as configuration errors.
//
// Every host call is synchronous and produces exactly one Term. A failing
// call is a `HostError`, which the resolver treats as goal failure.

use crate::builtins;
use crate::error::{AuthzError, HostError};
use crate::registry::{ClassRegistry, MemberKind};
use crate::term::{ExternalInstance, Term};

/// Callbacks the engine uses to read and invoke host-owned objects.
///
/// Implementations may block (e.g. an accessor that queries a database);
/// the engine imposes no timeout.
pub trait Host {
    /// Runtime class tag of an instance. Defaults to the tag carried in the
    /// handle.
    fn class_of(&self, instance: &ExternalInstance) -> String {
        instance.class.clone()
    }

    /// Read a field of an instance.
    fn get_field(&self, instance: &ExternalInstance, field: &str) -> Result<Term, HostError>;

    /// Invoke a method on an instance with already-resolved arguments.
    fn call_method(
        &self,
        instance: &ExternalInstance,
        method: &str,
        args: &[Term],
    ) -> Result<Term, HostError>;

    /// Host-level equality between two instances. Defaults to handle identity.
    fn equals(&self, left: &ExternalInstance, right: &ExternalInstance) -> Result<bool, HostError> {
        Ok(left.id == right.id)
    }
}

/// A host with no objects. Useful when every query argument is primitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHost;

impl Host for NoHost {
    fn get_field(&self, instance: &ExternalInstance, _field: &str) -> Result<Term, HostError> {
        Err(HostError::UnknownInstance(instance.id))
    }

    fn call_method(
        &self,
        instance: &ExternalInstance,
        _method: &str,
        _args: &[Term],
    ) -> Result<Term, HostError> {
        Err(HostError::UnknownInstance(instance.id))
    }
}

/// Registry-checked access to host objects and built-in values.
#[derive(Clone, Copy)]
pub struct HostBridge<'a> {
    registry: &'a ClassRegistry,
    host: &'a dyn Host,
}

impl<'a> HostBridge<'a> {
    pub fn new(registry: &'a ClassRegistry, host: &'a dyn Host) -> Self {
        Self { registry, host }
    }

    pub fn registry(&self) -> &'a ClassRegistry {
        self.registry
    }

    /// Class tag of a bound term, or `None` for variables and patterns.
    ///
    /// Instances whose class was never registered are a configuration error.
    pub fn class_of(&self, term: &Term) -> Result<Option<String>, AuthzError> {
        match term {
            Term::Atom(value) => Ok(Some(value.class_name().to_string())),
            Term::List(_) => Ok(Some("List".to_string())),
            Term::ExternalInstance(instance) => {
                let class = self.host.class_of(instance);
                if !self.registry.contains(&class) {
                    return Err(AuthzError::UnregisteredClass { class });
                }
                Ok(Some(class))
            }
            Term::Variable(_) | Term::Pattern(_) => Ok(None),
        }
    }

    pub fn is_subclass(&self, child: &str, parent: &str) -> bool {
        self.registry.is_subclass(child, parent)
    }

    /// `receiver.field`
    pub fn get_field(&self, receiver: &Term, field: &str) -> Result<Term, AuthzError> {
        let instance = match receiver {
            Term::ExternalInstance(instance) => instance,
            other => return Err(HostError::NotAnObject(other.to_string()).into()),
        };
        let class = self.checked_class(instance)?;
        if !self.registry.declares(&class, field, MemberKind::Field) {
            return Err(HostError::UnknownField {
                class,
                field: field.to_string(),
            }
            .into());
        }
        let value = self.host.get_field(instance, field)?;
        tracing::trace!(instance = %instance, field, value = %value, "host field read");
        Ok(value)
    }

    /// `receiver.method(args...)`; arguments must already be resolved.
    pub fn call_method(&self, receiver: &Term, method: &str, args: &[Term]) -> Result<Term, AuthzError> {
        let instance = match receiver {
            Term::ExternalInstance(instance) => instance,
            Term::Atom(_) | Term::List(_) => return Ok(builtins::call(receiver, method, args)?),
            other => return Err(HostError::NotAnObject(other.to_string()).into()),
        };
        let class = self.checked_class(instance)?;
        if !self.registry.declares(&class, method, MemberKind::Method) {
            return Err(HostError::UnknownMethod {
                class,
                method: method.to_string(),
            }
            .into());
        }
        let value = self.host.call_method(instance, method, args)?;
        tracing::trace!(instance = %instance, method, value = %value, "host method call");
        Ok(value)
    }

    /// Equality of two instances as the host defines it.
    pub fn equals(&self, left: &ExternalInstance, right: &ExternalInstance) -> Result<bool, HostError> {
        if left.id == right.id {
            return Ok(true);
        }
        self.host.equals(left, right)
    }

    fn checked_class(&self, instance: &ExternalInstance) -> Result<String, AuthzError> {
        let class = self.host.class_of(instance);
        if self.registry.contains(&class) {
            Ok(class)
        } else {
            Err(AuthzError::UnregisteredClass { class })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use crate::registry::ClassInfo;

    fn setup() -> (ClassRegistry, MemoryHost, ExternalInstance) {
        let mut registry = ClassRegistry::new();
        registry
            .register(ClassInfo::new("Expense").field("submitted_by").method("total"))
            .unwrap();
        let mut host = MemoryHost::new();
        let expense = host.insert(
            "Expense",
            [("submitted_by", Term::string("alice@example.com"))],
        );
        host.add_method("Expense", "total", |_, _| Ok(Term::integer(42)));
        (registry, host, expense)
    }

    #[test]
    fn declared_field_reaches_host() {
        let (registry, host, expense) = setup();
        let bridge = HostBridge::new(&registry, &host);
        let value = bridge.get_field(&expense.into(), "submitted_by").unwrap();
        assert_eq!(value, Term::string("alice@example.com"));
    }

    #[test]
    fn undeclared_member_is_host_error() {
        let (registry, host, expense) = setup();
        let bridge = HostBridge::new(&registry, &host);
        match bridge.get_field(&expense.clone().into(), "secret") {
            Err(AuthzError::Host(HostError::UnknownField { class, field })) => {
                assert_eq!(class, "Expense");
                assert_eq!(field, "secret");
            }
            other => panic!("expected UnknownField, got {:?}", other),
        }
        assert!(matches!(
            bridge.call_method(&expense.into(), "delete", &[]),
            Err(AuthzError::Host(HostError::UnknownMethod { .. }))
        ));
    }

    #[test]
    fn method_call_reaches_host() {
        let (registry, host, expense) = setup();
        let bridge = HostBridge::new(&registry, &host);
        assert_eq!(
            bridge.call_method(&expense.into(), "total", &[]).unwrap(),
            Term::integer(42)
        );
    }

    #[test]
    fn unregistered_instance_class_is_configuration_error() {
        let registry = ClassRegistry::new();
        let mut host = MemoryHost::new();
        let user = host.insert("User", [("name", Term::string("alice"))]);
        let bridge = HostBridge::new(&registry, &host);
        assert!(matches!(
            bridge.class_of(&user.clone().into()),
            Err(AuthzError::UnregisteredClass { .. })
        ));
        assert!(matches!(
            bridge.get_field(&user.into(), "name"),
            Err(AuthzError::UnregisteredClass { .. })
        ));
    }

    #[test]
    fn primitive_receivers_use_builtins() {
        let registry = ClassRegistry::new();
        let bridge = HostBridge::new(&registry, &NoHost);
        let result = bridge
            .call_method(&Term::string("bhavik@example.com"), "ends_with", &["@example.com".into()])
            .unwrap();
        assert_eq!(result, Term::boolean(true));
        assert_eq!(
            bridge.class_of(&Term::integer(3)).unwrap().as_deref(),
            Some("Integer")
        );
        assert!(matches!(
            bridge.get_field(&Term::string("x"), "len"),
            Err(AuthzError::Host(HostError::NotAnObject(_)))
        ));
    }
}
