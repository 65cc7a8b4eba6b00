//! # Entrada de Caché
//! src/cache/entry.rs
//!
//! Envuelve el contenido de un archivo con su estado de carga y su frescura.
//!
//! ```text
//!            load ok               ttl
//! Pending ───────────► Valid ───────────► Expired
//!    ▲  │ load error                         │
//!    │  └──────────► Missing                 │
//!    └───────── siguiente get() ◄────────────┘ (también desde Missing)
//! ```

use super::{CacheOutcome, Waiter};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Estado observable de una entrada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Hay una carga en curso
    Pending,

    /// Contenido cargado y dentro del TTL
    Valid,

    /// Contenido cargado pero más viejo que el TTL
    Expired,

    /// La última carga falló (archivo inexistente o ilegible)
    Missing,
}

#[derive(Debug)]
enum Slot {
    Loading,
    Loaded(Arc<[u8]>),
    Failed,
}

pub struct CacheEntry {
    slot: Slot,

    /// Momento en que se resolvió la última carga (o se armó la primera)
    created_at: Instant,

    /// Callbacks registrados mientras la entrada está Pending, en orden
    waiters: Vec<Waiter>,
}

impl CacheEntry {
    /// Entrada nueva en estado Pending con su primer waiter
    pub(crate) fn pending(now: Instant, first: Waiter) -> Self {
        Self {
            slot: Slot::Loading,
            created_at: now,
            waiters: vec![first],
        }
    }

    /// `now - created_at > ttl`
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }

    pub fn status(&self, ttl: Duration, now: Instant) -> EntryStatus {
        match self.slot {
            Slot::Loading => EntryStatus::Pending,
            Slot::Failed => EntryStatus::Missing,
            Slot::Loaded(_) if self.is_expired(ttl, now) => EntryStatus::Expired,
            Slot::Loaded(_) => EntryStatus::Valid,
        }
    }

    /// Contenido cargado, si lo hay
    pub fn content(&self) -> Option<&Arc<[u8]>> {
        match &self.slot {
            Slot::Loaded(content) => Some(content),
            _ => None,
        }
    }

    /// Número de callbacks esperando la carga en curso
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn add_waiter(&mut self, waiter: Waiter) {
        self.waiters.push(waiter);
    }

    /// Vuelve a Pending (desde Expired o Missing) con `first` como primer waiter
    ///
    /// El contenido viejo se suelta: quien ya lo recibió conserva su copia.
    pub(crate) fn rearm(&mut self, first: Waiter) {
        self.slot = Slot::Loading;
        self.waiters.push(first);
    }

    /// Sale de Pending con el resultado de la carga
    ///
    /// Retorna el resultado que se entrega y los waiters a invocar.
    pub(crate) fn resolve(
        &mut self,
        loaded: Option<Vec<u8>>,
        now: Instant,
    ) -> (CacheOutcome, Vec<Waiter>) {
        self.created_at = now;

        let outcome = match loaded {
            Some(bytes) => {
                let content: Arc<[u8]> = bytes.into();
                self.slot = Slot::Loaded(Arc::clone(&content));
                CacheOutcome::Found(content)
            }
            None => {
                self.slot = Slot::Failed;
                CacheOutcome::NotFound
            }
        };

        (outcome, std::mem::take(&mut self.waiters))
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("slot", &self.slot)
            .field("created_at", &self.created_at)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Waiter {
        Box::new(|_| {})
    }

    #[test]
    fn test_new_entry_is_pending() {
        let now = Instant::now();
        let entry = CacheEntry::pending(now, noop());

        assert_eq!(entry.status(Duration::from_secs(1), now), EntryStatus::Pending);
        assert_eq!(entry.waiter_count(), 1);
        assert!(entry.content().is_none());
    }

    #[test]
    fn test_resolve_hands_back_waiters_in_order() {
        let now = Instant::now();
        let mut entry = CacheEntry::pending(now, noop());
        entry.add_waiter(noop());
        entry.add_waiter(noop());

        let (outcome, waiters) = entry.resolve(Some(b"abc".to_vec()), now);

        assert_eq!(outcome, CacheOutcome::Found(Arc::from(&b"abc"[..])));
        assert_eq!(waiters.len(), 3);
        assert_eq!(entry.waiter_count(), 0);
        assert_eq!(entry.status(Duration::from_secs(1), now), EntryStatus::Valid);
    }

    #[test]
    fn test_expiry_is_strictly_greater_than_ttl() {
        let start = Instant::now();
        let mut entry = CacheEntry::pending(start, noop());
        let _ = entry.resolve(Some(Vec::new()), start);
        let ttl = Duration::from_millis(100);

        assert_eq!(entry.status(ttl, start + ttl), EntryStatus::Valid);
        assert_eq!(
            entry.status(ttl, start + ttl + Duration::from_millis(1)),
            EntryStatus::Expired
        );
    }

    #[test]
    fn test_failed_load_is_missing_and_can_rearm() {
        let now = Instant::now();
        let mut entry = CacheEntry::pending(now, noop());

        let (outcome, _) = entry.resolve(None, now);
        assert_eq!(outcome, CacheOutcome::NotFound);
        assert_eq!(entry.status(Duration::from_secs(1), now), EntryStatus::Missing);

        entry.rearm(noop());
        assert_eq!(entry.status(Duration::from_secs(1), now), EntryStatus::Pending);
        assert_eq!(entry.waiter_count(), 1);
    }
}
