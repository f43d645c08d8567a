// memory.rs — In-memory `Host` implementation.
//
// Objects are plain records: a class tag and a field map. Methods are
// closures registered per class. Good enough for tests, the CLI's data
// fixtures, and applications whose authorization data is already in memory.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::HostError;
use crate::host::Host;
use crate::term::{ExternalInstance, InstanceId, Term};

/// A record owned by a [`MemoryHost`].
#[derive(Debug, Clone, PartialEq)]
pub struct HostObject {
    pub class: String,
    pub fields: BTreeMap<String, Term>,
}

/// A method implementation: receives the record and resolved arguments.
pub type MethodFn = Arc<dyn Fn(&HostObject, &[Term]) -> Result<Term, HostError> + Send + Sync>;

#[derive(Default)]
pub struct MemoryHost {
    objects: HashMap<InstanceId, HostObject>,
    names: HashMap<String, InstanceId>,
    methods: HashMap<(String, String), MethodFn>,
    next_id: u64,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record and return its handle.
    pub fn insert<K, I>(&mut self, class: &str, fields: I) -> ExternalInstance
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Term)>,
    {
        self.next_id += 1;
        let id = InstanceId(self.next_id);
        let object = HostObject {
            class: class.to_string(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        };
        self.objects.insert(id, object);
        ExternalInstance::new(id, class)
    }

    /// Store a record under a name so it can be found again with [`Self::named`].
    pub fn insert_named<K, I>(&mut self, name: &str, class: &str, fields: I) -> ExternalInstance
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Term)>,
    {
        let instance = self.insert(class, fields);
        self.names.insert(name.to_string(), instance.id);
        instance
    }

    /// Register a method for every record of `class`.
    pub fn add_method<F>(&mut self, class: &str, method: &str, f: F)
    where
        F: Fn(&HostObject, &[Term]) -> Result<Term, HostError> + Send + Sync + 'static,
    {
        self.methods
            .insert((class.to_string(), method.to_string()), Arc::new(f));
    }

    pub fn get(&self, id: InstanceId) -> Option<&HostObject> {
        self.objects.get(&id)
    }

    pub fn named(&self, name: &str) -> Option<ExternalInstance> {
        let id = *self.names.get(name)?;
        let object = self.objects.get(&id)?;
        Some(ExternalInstance::new(id, object.class.clone()))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn object(&self, instance: &ExternalInstance) -> Result<&HostObject, HostError> {
        self.objects
            .get(&instance.id)
            .ok_or(HostError::UnknownInstance(instance.id))
    }
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost")
            .field("objects", &self.objects.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl Host for MemoryHost {
    fn class_of(&self, instance: &ExternalInstance) -> String {
        self.objects
            .get(&instance.id)
            .map(|o| o.class.clone())
            .unwrap_or_else(|| instance.class.clone())
    }

    fn get_field(&self, instance: &ExternalInstance, field: &str) -> Result<Term, HostError> {
        let object = self.object(instance)?;
        object
            .fields
            .get(field)
            .cloned()
            .ok_or_else(|| HostError::UnknownField {
                class: object.class.clone(),
                field: field.to_string(),
            })
    }

    fn call_method(
        &self,
        instance: &ExternalInstance,
        method: &str,
        args: &[Term],
    ) -> Result<Term, HostError> {
        let object = self.object(instance)?;
        let f = self
            .methods
            .get(&(object.class.clone(), method.to_string()))
            .ok_or_else(|| HostError::UnknownMethod {
                class: object.class.clone(),
                method: method.to_string(),
            })?;
        f(object, args)
    }

    /// Records are equal when they have the same class and fields.
    fn equals(&self, left: &ExternalInstance, right: &ExternalInstance) -> Result<bool, HostError> {
        Ok(self.object(left)? == self.object(right)?)
    }
}
