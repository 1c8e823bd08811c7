//! Capability registry.
//!
//! Maps a capability trait object type (`dyn Clock`, `dyn MetricsSink`, ...)
//! to the implementation the runner should use. There is no process-wide
//! instance; whoever builds the runner owns the registry.
//!
//! ```rust
//! use std::sync::Arc;
//! use slo_stress::adapters::FixedRandom;
//! use slo_stress::ports::RandomSource;
//! use slo_stress::Registry;
//!
//! let registry = Registry::new();
//! registry.bind::<dyn RandomSource, _>(|_| Arc::new(FixedRandom::new(0.5)));
//! let random = registry.resolve::<dyn RandomSource>().unwrap();
//! assert_eq!(random.uniform01(), 0.5);
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::adapters::{
    NoopAlertSink, ScriptedValidator, SeededRandom, SimulatedValidator, SimulationProfile,
    SystemClock, TracingAlertSink,
};
use crate::error::RegistryError;
use crate::metrics::InMemoryMetrics;
use crate::ports::{AlertSink, Clock, MetricsSink, RandomSource, ValidatedOperation};

/// Seed of the random source bound for unit runs.
pub const UNIT_SEED: u64 = 42;

/// Type-erased `Arc<T>`.
type Instance = Box<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Registry) -> Result<Instance, RegistryError> + Send + Sync>;

#[derive(Default)]
struct Bindings {
    factories: HashMap<TypeId, Factory>,
    singletons: HashMap<TypeId, Instance>,
    cache: HashMap<TypeId, Instance>,
    /// Bumped whenever a factory is replaced.
    generations: HashMap<TypeId, u64>,
}

/// Named sets of default bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Always-passing scripted operation, seeded randomness.
    Unit,
    /// Simulated operation with occasional failures, OS-seeded randomness.
    Integration,
    /// Simulated operation with a wider latency spread and rare fatal errors.
    Stress,
}

impl Environment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Environment::Unit => "unit",
            Environment::Integration => "integration",
            Environment::Stress => "stress",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unit" => Ok(Environment::Unit),
            "integration" => Ok(Environment::Integration),
            "stress" => Ok(Environment::Stress),
            other => Err(format!("unknown environment `{other}`")),
        }
    }
}

/// Typed capability container.
///
/// Singletons take precedence over factories. Factory results are cached
/// until the factory is rebound or [`reset`](Registry::reset) is called.
pub struct Registry {
    environment: Option<Environment>,
    bindings: Mutex<Bindings>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            environment: None,
            bindings: Mutex::new(Bindings::default()),
        }
    }

    /// Registry pre-populated with the bindings of `environment`.
    pub fn for_environment(environment: Environment) -> Self {
        let registry = Self {
            environment: Some(environment),
            ..Self::new()
        };

        registry.bind::<dyn Clock, _>(|_| Arc::new(SystemClock::new()));
        registry.try_bind::<dyn MetricsSink, _>(|r| {
            Ok(Arc::new(InMemoryMetrics::new(r.resolve::<dyn Clock>()?)))
        });

        match environment {
            Environment::Unit => {
                registry
                    .bind::<dyn RandomSource, _>(|_| Arc::new(SeededRandom::new(UNIT_SEED)))
                    .bind::<dyn ValidatedOperation, _>(|_| Arc::new(ScriptedValidator::always_pass()))
                    .bind::<dyn AlertSink, _>(|_| Arc::new(NoopAlertSink));
            }
            Environment::Integration | Environment::Stress => {
                let profile = if environment == Environment::Stress {
                    SimulationProfile::stress()
                } else {
                    SimulationProfile::integration()
                };
                registry
                    .bind::<dyn RandomSource, _>(|_| Arc::new(SeededRandom::from_entropy()))
                    .try_bind::<dyn ValidatedOperation, _>(move |r| {
                        Ok(Arc::new(SimulatedValidator::new(
                            profile,
                            r.resolve::<dyn RandomSource>()?,
                        )))
                    })
                    .bind::<dyn AlertSink, _>(|_| Arc::new(TracingAlertSink));
            }
        }

        debug!(%environment, "registry populated");
        registry
    }

    pub fn environment(&self) -> Option<Environment> {
        self.environment
    }

    /// Register or replace the factory for `T`, dropping any cached instance.
    pub fn bind<T, F>(&self, factory: F) -> &Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Registry) -> Arc<T> + Send + Sync + 'static,
    {
        self.try_bind::<T, _>(move |r| Ok(factory(r)))
    }

    /// [`bind`](Registry::bind) for factories that can fail, typically
    /// because they resolve other capabilities.
    pub fn try_bind<T, F>(&self, factory: F) -> &Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Registry) -> Result<Arc<T>, RegistryError> + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        let erased: Factory = Arc::new(move |r: &Registry| {
            factory(r).map(|instance| Box::new(instance) as Instance)
        });

        let mut bindings = self.bindings.lock();
        bindings.factories.insert(id, erased);
        bindings.cache.remove(&id);
        *bindings.generations.entry(id).or_insert(0) += 1;
        self
    }

    /// Register a fixed instance for `T`. It wins over any factory.
    pub fn bind_singleton<T>(&self, instance: Arc<T>) -> &Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        self.bindings.lock().singletons.insert(id, Box::new(instance));
        self
    }

    /// Whether anything is bound for `T`.
    pub fn is_bound<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        let bindings = self.bindings.lock();
        bindings.singletons.contains_key(&id) || bindings.factories.contains_key(&id)
    }

    /// Resolve `T`, failing with [`RegistryError::Unbound`] when nothing is bound.
    pub fn resolve<T>(&self) -> Result<Arc<T>, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_optional::<T>()?.ok_or(RegistryError::Unbound {
            capability: type_name::<T>(),
        })
    }

    /// Resolve `T`, `None` when nothing is bound.
    pub fn resolve_optional<T>(&self) -> Result<Option<Arc<T>>, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        let (factory, generation) = {
            let bindings = self.bindings.lock();
            if let Some(instance) = bindings.singletons.get(&id) {
                return downcast::<T>(instance).map(Some);
            }
            if let Some(instance) = bindings.cache.get(&id) {
                return downcast::<T>(instance).map(Some);
            }
            match bindings.factories.get(&id) {
                Some(factory) => (factory.clone(), bindings.generations.get(&id).copied()),
                None => return Ok(None),
            }
        };

        // Unlocked: the factory may resolve other capabilities.
        let instance = factory(self)?;
        let resolved = downcast::<T>(&instance)?;

        let mut bindings = self.bindings.lock();
        if bindings.generations.get(&id).copied() != generation {
            // rebound while constructing; hand out the instance uncached
            return Ok(Some(resolved));
        }
        if let Some(cached) = bindings.cache.get(&id) {
            // a concurrent resolve finished first
            return downcast::<T>(cached).map(Some);
        }
        bindings.cache.insert(id, instance);
        debug!(capability = type_name::<T>(), "capability constructed");
        Ok(Some(resolved))
    }

    /// Drop cached instances. Bindings and singletons are kept.
    pub fn reset(&self) {
        self.bindings.lock().cache.clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.bindings.lock();
        f.debug_struct("Registry")
            .field("environment", &self.environment)
            .field("factories", &bindings.factories.len())
            .field("singletons", &bindings.singletons.len())
            .field("cached", &bindings.cache.len())
            .finish()
    }
}

fn downcast<T>(instance: &Instance) -> Result<Arc<T>, RegistryError>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| RegistryError::Factory {
            capability: type_name::<T>(),
            reason: "instance has unexpected type".to_string(),
        })
}
