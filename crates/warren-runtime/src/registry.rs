//! Actor type registry
//!
//! TigerStyle: Routing is decided once, up front. An unknown type or method
//! is rejected before any mailbox or instance exists.

use crate::actor::Actor;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use warren_core::constants::{ACTOR_METHOD_LENGTH_BYTES_MAX, ACTOR_TYPE_LENGTH_BYTES_MAX};
use warren_core::{is_valid_name, ActorId, Error, Result};

/// Factory for creating actors
pub trait ActorFactory: Send + Sync + 'static {
    /// Create a new actor instance for `id`
    fn create(&self, id: &ActorId) -> Box<dyn Actor>;
}

/// Simple factory that clones a prototype actor
pub struct CloneFactory<A: Actor + Clone + Sync> {
    prototype: A,
}

impl<A: Actor + Clone + Sync> CloneFactory<A> {
    /// Create a new clone factory
    pub fn new(prototype: A) -> Self {
        Self { prototype }
    }
}

impl<A: Actor + Clone + Sync> ActorFactory for CloneFactory<A> {
    fn create(&self, _id: &ActorId) -> Box<dyn Actor> {
        Box::new(self.prototype.clone())
    }
}

/// A registered actor type
#[derive(Clone)]
pub struct ActorType {
    /// Type name
    pub name: String,
    /// Methods callers and timers may invoke
    pub methods: Arc<HashSet<String>>,
    /// Everything a timer may target: `methods` plus timer-only callbacks
    pub timer_targets: Arc<HashSet<String>>,
    /// Creates instances on activation
    pub factory: Arc<dyn ActorFactory>,
}

impl std::fmt::Debug for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorType")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("timer_targets", &self.timer_targets)
            .finish()
    }
}

/// Registered actor types, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ActorTypeRegistry {
    types: HashMap<String, ActorType>,
}

impl ActorTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type whose methods come from its `Actor` impl
    pub fn register<A: Actor>(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn ActorFactory>,
    ) -> Result<()> {
        self.register_with_methods(name, A::methods(), A::callbacks(), factory)
    }

    /// Register a type that is instantiated by cloning `prototype`
    pub fn register_clone<A: Actor + Clone + Sync>(
        &mut self,
        name: impl Into<String>,
        prototype: A,
    ) -> Result<()> {
        self.register::<A>(name, Arc::new(CloneFactory::new(prototype)))
    }

    /// Register a type with explicit method and timer callback tables
    pub fn register_with_methods(
        &mut self,
        name: impl Into<String>,
        methods: &[&str],
        callbacks: &[&str],
        factory: Arc<dyn ActorFactory>,
    ) -> Result<()> {
        let name = name.into();

        if name.is_empty() || name.len() > ACTOR_TYPE_LENGTH_BYTES_MAX || !is_valid_name(&name) {
            return Err(Error::InvalidConfiguration {
                field: "actor_type".into(),
                reason: format!("invalid actor type name '{}'", name),
            });
        }
        if self.types.contains_key(&name) {
            return Err(Error::InvalidConfiguration {
                field: "actor_type".into(),
                reason: format!("actor type '{}' registered twice", name),
            });
        }
        if let Some(bad) = methods
            .iter()
            .chain(callbacks)
            .find(|m| m.is_empty() || m.len() > ACTOR_METHOD_LENGTH_BYTES_MAX)
        {
            return Err(Error::InvalidConfiguration {
                field: "methods".into(),
                reason: format!("invalid method name '{}' on {}", bad, name),
            });
        }

        let methods: HashSet<String> = methods.iter().map(|m| m.to_string()).collect();
        let mut timer_targets = methods.clone();
        timer_targets.extend(callbacks.iter().map(|c| c.to_string()));
        self.types.insert(
            name.clone(),
            ActorType {
                name,
                methods: Arc::new(methods),
                timer_targets: Arc::new(timer_targets),
                factory,
            },
        );
        Ok(())
    }

    /// Look up a type
    pub fn get(&self, actor_type: &str) -> Option<&ActorType> {
        self.types.get(actor_type)
    }

    /// Check that `method` may be called on `actor_type`
    pub fn resolve(&self, actor_type: &str, method: &str) -> Result<&ActorType> {
        let registered = self
            .types
            .get(actor_type)
            .ok_or_else(|| Error::unknown_actor_type(actor_type))?;
        if !registered.methods.contains(method) {
            return Err(Error::no_such_method(actor_type, method));
        }
        Ok(registered)
    }

    /// Registered type names
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ActorContext;
    use async_trait::async_trait;
    use bytes::Bytes;

    #[derive(Clone)]
    struct Echo;

    #[async_trait]
    impl Actor for Echo {
        fn methods() -> &'static [&'static str] {
            &["echo"]
        }

        async fn invoke(
            &mut self,
            _ctx: &mut ActorContext,
            _method: &str,
            payload: Bytes,
        ) -> Result<Bytes> {
            Ok(payload)
        }
    }

    #[test]
    fn test_resolve() {
        let mut registry = ActorTypeRegistry::new();
        registry.register_clone("Echo", Echo).unwrap();

        assert!(registry.resolve("Echo", "echo").is_ok());
        assert!(matches!(
            registry.resolve("Echo", "shout"),
            Err(Error::NoSuchMethod { .. })
        ));
        assert!(matches!(
            registry.resolve("Missing", "echo"),
            Err(Error::UnknownActorType { .. })
        ));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = ActorTypeRegistry::new();
        registry.register_clone("Echo", Echo).unwrap();
        assert!(matches!(
            registry.register_clone("Echo", Echo),
            Err(Error::InvalidConfiguration { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut registry = ActorTypeRegistry::new();
        assert!(registry.register_clone("bad type", Echo).is_err());

        let factory: Arc<dyn ActorFactory> = Arc::new(CloneFactory::new(Echo));
        assert!(registry
            .register_with_methods("Echo", &[""], &[], factory.clone())
            .is_err());
        assert!(registry
            .register_with_methods("Echo", &["a"], &[""], factory.clone())
            .is_err());
        registry
            .register_with_methods("Echo", &["a", "b"], &[], factory)
            .unwrap();
        assert_eq!(registry.get("Echo").unwrap().methods.len(), 2);
    }

    #[test]
    fn test_timer_callbacks_are_not_callable() {
        #[derive(Clone)]
        struct Ticker;

        #[async_trait]
        impl Actor for Ticker {
            fn methods() -> &'static [&'static str] {
                &["start"]
            }

            fn callbacks() -> &'static [&'static str] {
                &["tick"]
            }

            async fn invoke(
                &mut self,
                _ctx: &mut ActorContext,
                _method: &str,
                _payload: Bytes,
            ) -> Result<Bytes> {
                Ok(Bytes::new())
            }
        }

        let mut registry = ActorTypeRegistry::new();
        registry.register_clone("Ticker", Ticker).unwrap();

        assert!(registry.resolve("Ticker", "start").is_ok());
        assert!(matches!(
            registry.resolve("Ticker", "tick"),
            Err(Error::NoSuchMethod { .. })
        ));

        let ticker = registry.get("Ticker").unwrap();
        assert!(ticker.timer_targets.contains("tick"));
        assert!(ticker.timer_targets.contains("start"));
    }
}
