//! Reflection context
//!
//! A [`Reflector`] bundles a frozen [`TypeRegistry`], the descriptor cache
//! built against it and the mirror configuration. It is cheap to clone and
//! can be shared across threads; every mirror keeps a handle to the
//! reflector that created it.

use std::any::Any;
use std::sync::Arc;

use crate::cache::DescriptorCache;
use crate::config::MirrorConfig;
use crate::error::MirrorResult;
use crate::mirror::InstanceMirror;
use crate::registry::TypeRegistry;
use crate::value::ErasedValue;

#[derive(Debug)]
struct ReflectorInner {
    registry: TypeRegistry,
    cache: DescriptorCache,
    config: MirrorConfig,
}

/// Shared registry, cache and configuration
#[derive(Debug, Clone)]
pub struct Reflector {
    inner: Arc<ReflectorInner>,
}

impl Reflector {
    /// Create a reflector with the default configuration
    pub fn new(registry: TypeRegistry) -> Self {
        Self::with_config(registry, MirrorConfig::default())
    }

    /// Create a reflector with a custom configuration
    pub fn with_config(registry: TypeRegistry, config: MirrorConfig) -> Self {
        Self {
            inner: Arc::new(ReflectorInner {
                registry,
                cache: DescriptorCache::new(),
                config,
            }),
        }
    }

    /// Registered types
    #[inline]
    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    /// Field tables built so far
    #[inline]
    pub fn cache(&self) -> &DescriptorCache {
        &self.inner.cache
    }

    /// Mirror configuration
    #[inline]
    pub fn config(&self) -> &MirrorConfig {
        &self.inner.config
    }

    /// Mirror an erased value; see [`InstanceMirror::new`]
    pub fn mirror(&self, value: ErasedValue) -> Option<InstanceMirror> {
        InstanceMirror::new(self, value)
    }

    /// Erase and mirror a concrete value
    pub fn mirror_of<T: Any + Send + Sync>(&self, value: T) -> Option<InstanceMirror> {
        self.mirror(ErasedValue::new(value))
    }

    /// Mirror an erased value or report why it cannot be; see [`InstanceMirror::reflecting`]
    pub fn reflecting(&self, value: ErasedValue) -> MirrorResult<InstanceMirror> {
        InstanceMirror::reflecting(self, value)
    }
}
