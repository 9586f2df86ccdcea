//! The per-interface ARP cache: a mutex-protected IPv4→MAC map with a
//! blocking `resolve` that doubles as a synchronous façade over ARP's
//! asynchronous request/reply protocol.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use pnet::util::MacAddr;

use crate::error::{Result, RouterError};

/// Resolution budget: 100 iterations of 10ms = 1s wall-clock, with a
/// request re-sent every 10th iteration (every 100ms, 10 sends total).
const RESOLVE_ITERATIONS: u32 = 100;
const RESOLVE_POLL_INTERVAL: Duration = Duration::from_millis(10);
const RESOLVE_REQUEST_EVERY: u32 = 10;

/// Emits an ARP request for `target` on the owning interface. Implemented
/// by the interface worker once its raw ARP socket is open; until then the
/// cache's writer slot is empty and `resolve` fails fast with
/// `ArpWriterNotInitialized`.
pub trait ArpWriter: Send + Sync {
    fn send_request(&self, target: Ipv4Addr) -> Result<()>;
}

/// IPv4→MAC map owned by one [`InterfaceConfig`](crate::interface::InterfaceConfig).
pub struct ArpCache {
    map: RwLock<HashMap<Ipv4Addr, MacAddr>>,
    writer: RwLock<Option<Arc<dyn ArpWriter>>>,
    /// IPs with an in-flight `resolve` loop already sending requests, so
    /// concurrent resolutions of the same IP don't each launch independent
    /// request storms.
    resolving: Mutex<HashSet<Ipv4Addr>>,
}

impl ArpCache {
    pub fn new() -> Self {
        ArpCache {
            map: RwLock::new(HashMap::new()),
            writer: RwLock::new(None),
            resolving: Mutex::new(HashSet::new()),
        }
    }

    /// Injects the ARP writer once the owning interface's raw socket is open.
    pub fn set_writer(&self, writer: Arc<dyn ArpWriter>) {
        *self.writer.write().unwrap() = Some(writer);
    }

    /// Inserts or overwrites an entry. Last writer wins: a fresher mapping
    /// always replaces a stale one rather than being ignored.
    pub fn store(&self, ip: Ipv4Addr, mac: MacAddr) {
        self.map.write().unwrap().insert(ip, mac);
    }

    /// Non-blocking cache lookup.
    pub fn get(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.map.read().unwrap().get(&ip).copied()
    }

    /// Resolves `ip` to a MAC, blocking up to ~1 second. Returns
    /// immediately on a cache hit. Otherwise, the cache lock is never held
    /// across a sleep: each iteration takes the read lock just long enough
    /// to check for a hit, then releases it before sleeping.
    pub fn resolve(&self, ip: Ipv4Addr) -> Result<MacAddr> {
        if let Some(mac) = self.get(ip) {
            return Ok(mac);
        }

        // Only the first concurrent resolver for this IP sends requests;
        // the rest just poll the cache on the same schedule.
        let is_leader = self.resolving.lock().unwrap().insert(ip);

        let outcome = (|| {
            for i in 0..RESOLVE_ITERATIONS {
                if is_leader && i % RESOLVE_REQUEST_EVERY == 0 {
                    let writer = self
                        .writer
                        .read()
                        .unwrap()
                        .clone()
                        .ok_or(RouterError::ArpWriterNotInitialized)?;
                    writer.send_request(ip)?;
                }
                thread::sleep(RESOLVE_POLL_INTERVAL);
                if let Some(mac) = self.get(ip) {
                    return Ok(mac);
                }
            }
            Err(RouterError::ArpTimeout(ip))
        })();

        if is_leader {
            self.resolving.lock().unwrap().remove(&ip);
        }
        outcome
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWriter {
        calls: AtomicUsize,
    }

    impl ArpWriter for CountingWriter {
        fn send_request(&self, _target: Ipv4Addr) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn resolve_returns_immediately_on_cache_hit() {
        let cache = ArpCache::new();
        let mac = MacAddr::new(1, 2, 3, 4, 5, 6);
        cache.store("10.0.0.1".parse().unwrap(), mac);
        assert_eq!(cache.resolve("10.0.0.1".parse().unwrap()).unwrap(), mac);
    }

    #[test]
    fn resolve_times_out_after_exactly_ten_requests() {
        let cache = ArpCache::new();
        let writer = Arc::new(CountingWriter {
            calls: AtomicUsize::new(0),
        });
        cache.set_writer(writer.clone());

        let err = cache.resolve("192.168.0.100".parse().unwrap()).unwrap_err();
        assert_eq!(err, RouterError::ArpTimeout("192.168.0.100".parse().unwrap()));
        assert_eq!(writer.calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn resolve_fails_fast_without_a_writer() {
        let cache = ArpCache::new();
        let err = cache.resolve("192.168.0.100".parse().unwrap()).unwrap_err();
        assert_eq!(err, RouterError::ArpWriterNotInitialized);
    }

    #[test]
    fn resolve_unblocks_as_soon_as_an_entry_is_stored_from_another_thread() {
        use std::sync::Arc as StdArc;
        use std::thread;

        let cache = StdArc::new(ArpCache::new());
        let writer = Arc::new(CountingWriter {
            calls: AtomicUsize::new(0),
        });
        cache.set_writer(writer);

        let ip: Ipv4Addr = "172.16.0.5".parse().unwrap();
        let mac = MacAddr::new(9, 9, 9, 9, 9, 9);
        let writer_cache = StdArc::clone(&cache);
        let handle = thread::spawn(move || writer_cache.resolve(ip));

        thread::sleep(Duration::from_millis(30));
        cache.store(ip, mac);

        assert_eq!(handle.join().unwrap().unwrap(), mac);
    }
}
