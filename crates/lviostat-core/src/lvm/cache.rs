//! Time-boxed reuse of volume metadata lookups.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::lvm::{MetadataError, VolumeInfo, VolumeResolver};

/// Caches resolver results keyed by the exact argument list.
///
/// `["vg0", "vg1"]` and `["vg1", "vg0"]` are different keys. Failures are
/// never cached.
pub struct MetadataCache<R: VolumeResolver> {
    inner: R,
    ttl: Duration,
    entries: HashMap<Vec<String>, (Instant, Vec<VolumeInfo>)>,
}

impl<R: VolumeResolver> MetadataCache<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the wrapped resolver.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Resolves `names` as of `now`, reusing an entry younger than the TTL.
    pub fn resolve_at(
        &mut self,
        names: &[String],
        now: Instant,
    ) -> Result<Vec<VolumeInfo>, MetadataError> {
        if let Some((stored, volumes)) = self.entries.get(names)
            && now.saturating_duration_since(*stored) < self.ttl
        {
            trace!("Metadata cache hit for {:?}", names);
            return Ok(volumes.clone());
        }

        let volumes = self.inner.resolve(names)?;
        self.entries
            .insert(names.to_vec(), (now, volumes.clone()));
        Ok(volumes)
    }
}

impl<R: VolumeResolver> VolumeResolver for MetadataCache<R> {
    fn resolve(&mut self, names: &[String]) -> Result<Vec<VolumeInfo>, MetadataError> {
        self.resolve_at(names, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lvm::Segment;

    /// Resolver answering every name with one single-segment volume.
    struct CountingResolver {
        calls: usize,
        fail: bool,
    }

    impl VolumeResolver for CountingResolver {
        fn resolve(&mut self, names: &[String]) -> Result<Vec<VolumeInfo>, MetadataError> {
            self.calls += 1;
            if self.fail {
                return Err(MetadataError::Command("boom".to_string()));
            }
            Ok(names
                .iter()
                .map(|n| VolumeInfo {
                    name: n.clone(),
                    dm_name: n.replace('/', "-"),
                    segments: vec![Segment {
                        start: 0,
                        length: 8,
                    }],
                })
                .collect())
        }
    }

    fn key(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hit_within_ttl() {
        let mut cache = MetadataCache::new(
            CountingResolver {
                calls: 0,
                fail: false,
            },
            Duration::from_secs(10),
        );
        let t0 = Instant::now();

        let first = cache.resolve_at(&key(&["vg0/a"]), t0).unwrap();
        let second = cache
            .resolve_at(&key(&["vg0/a"]), t0 + Duration::from_secs(9))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.inner().calls, 1);
    }

    #[test]
    fn test_expired_entry_is_refreshed() {
        let mut cache = MetadataCache::new(
            CountingResolver {
                calls: 0,
                fail: false,
            },
            Duration::from_secs(10),
        );
        let t0 = Instant::now();

        cache.resolve_at(&key(&["vg0/a"]), t0).unwrap();
        cache
            .resolve_at(&key(&["vg0/a"]), t0 + Duration::from_secs(10))
            .unwrap();
        assert_eq!(cache.inner().calls, 2);
    }

    #[test]
    fn test_keys_match_exact_arguments() {
        let mut cache = MetadataCache::new(
            CountingResolver {
                calls: 0,
                fail: false,
            },
            Duration::from_secs(10),
        );
        let t0 = Instant::now();

        cache.resolve_at(&key(&["a", "b"]), t0).unwrap();
        cache.resolve_at(&key(&["b", "a"]), t0).unwrap();
        cache.resolve_at(&key(&["a"]), t0).unwrap();
        assert_eq!(cache.inner().calls, 3);

        cache.resolve_at(&key(&["b", "a"]), t0).unwrap();
        assert_eq!(cache.inner().calls, 3);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let mut cache = MetadataCache::new(
            CountingResolver {
                calls: 0,
                fail: true,
            },
            Duration::from_secs(10),
        );

        assert!(cache.resolve(&key(&["a"])).is_err());
        assert!(cache.resolve(&key(&["a"])).is_err());
        assert_eq!(cache.inner().calls, 2);
    }
}
