//! Result cache for cacheable operations

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use crate::amf::{Amf3Encoder, CodecContext, Value};
use crate::error::AmfError;

/// Cache key: qualified operation name plus the encoded argument list
///
/// Arguments are keyed by their AMF3 encoding with object references turned
/// off, so equal argument lists give equal keys whether or not they share
/// allocations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: String,
    args: Bytes,
}

impl CacheKey {
    pub fn new(operation: impl Into<String>, args: &[Value]) -> Result<Self, AmfError> {
        let mut encoder =
            Amf3Encoder::with_context(CodecContext::default()).without_object_references();
        encoder.encode_all(args)?;
        Ok(Self {
            operation: operation.into(),
            args: encoder.finish(),
        })
    }

    /// Qualified `Service.method` name
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Result cache capability
///
/// Implementations must be safe for concurrent use.
pub trait ResultCache: Send + Sync {
    fn contains(&self, key: &CacheKey) -> bool;

    fn get(&self, key: &CacheKey) -> Option<Value>;

    fn put(&self, key: CacheKey, value: Value);
}

struct Entry {
    value: Value,
    stored: Instant,
}

/// Bounded LRU cache with an optional time to live
pub struct LruResultCache {
    inner: Mutex<LruCache<CacheKey, Entry>>,
    ttl: Option<Duration>,
}

impl LruResultCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl: None,
        }
    }

    /// Entries older than `ttl` are treated as absent
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        self.ttl.map_or(true, |ttl| entry.stored.elapsed() < ttl)
    }
}

impl ResultCache for LruResultCache {
    fn contains(&self, key: &CacheKey) -> bool {
        let cache = self.inner.lock();
        cache.peek(key).is_some_and(|entry| self.is_fresh(entry))
    }

    fn get(&self, key: &CacheKey) -> Option<Value> {
        let mut cache = self.inner.lock();
        let fresh = self.is_fresh(cache.peek(key)?);
        if !fresh {
            cache.pop(key);
            return None;
        }
        cache.get(key).map(|entry| entry.value.clone())
    }

    fn put(&self, key: CacheKey, value: Value) {
        let entry = Entry {
            value,
            stored: Instant::now(),
        };
        self.inner.lock().put(key, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn key(op: &str, args: &[Value]) -> CacheKey {
        CacheKey::new(op, args).unwrap()
    }

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_key_equality() {
        let a = key("Echo.echo", &[Value::from("x"), Value::Integer(1)]);
        let b = key("Echo.echo", &[Value::from("x"), Value::Integer(1)]);
        assert_eq!(a, b);
        assert_ne!(a, key("Echo.echo", &[Value::from("x"), Value::Integer(2)]));
        assert_ne!(a, key("Echo.other", &[Value::from("x"), Value::Integer(1)]));
        assert_eq!(a.operation(), "Echo.echo");
    }

    #[test]
    fn test_key_ignores_shared_allocations() {
        let point = Value::from(crate::amf::Object::anonymous([("x", 1.0)]));
        let copy = Value::from(crate::amf::Object::anonymous([("x", 1.0)]));
        let shared = key("Geo.pair", &[point.clone(), point.clone()]);
        let separate = key("Geo.pair", &[point, copy]);
        assert_eq!(shared, separate);
    }

    #[test]
    fn test_put_get() {
        let cache = LruResultCache::new(capacity(4));
        let k = key("S.m", &[]);
        assert!(!cache.contains(&k));
        assert!(cache.get(&k).is_none());

        cache.put(k.clone(), Value::from("cached"));
        assert!(cache.contains(&k));
        assert_eq!(cache.get(&k), Some(Value::from("cached")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = LruResultCache::new(capacity(2));
        let (a, b, c) = (key("S.a", &[]), key("S.b", &[]), key("S.c", &[]));
        cache.put(a.clone(), Value::Integer(1));
        cache.put(b.clone(), Value::Integer(2));
        // Touch a so b becomes the eviction candidate
        assert!(cache.get(&a).is_some());
        cache.put(c.clone(), Value::Integer(3));

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = LruResultCache::new(capacity(2)).with_ttl(Duration::from_millis(10));
        let k = key("S.m", &[]);
        cache.put(k.clone(), Value::Null);
        thread::sleep(Duration::from_millis(30));
        assert!(!cache.contains(&k));
        assert!(cache.get(&k).is_none());
        assert!(cache.is_empty());
    }
}
