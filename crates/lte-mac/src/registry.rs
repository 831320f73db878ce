use std::collections::HashMap;
use std::sync::{Mutex, RwLock, RwLockReadGuard};

use lte_core::{MacError, Rnti, RNTI_ALLOC_END, RNTI_ALLOC_START};

use crate::ue::UeContext;

/// Registry membership of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeState {
    Active,
    /// Logically removed, kept alive until the removal grace period elapses
    Draining,
    Unknown,
}

/// The two ownership containers guarded by the registry lock. A record is in
/// at most one of them; the third possible owner is the pool.
pub struct Maps {
    active: HashMap<Rnti, Mutex<UeContext>>,
    draining: HashMap<Rnti, Mutex<UeContext>>,
}

impl Maps {
    pub fn get_active(&self, rnti: Rnti) -> Option<&Mutex<UeContext>> {
        self.active.get(&rnti)
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (&Rnti, &Mutex<UeContext>)> {
        self.active.iter()
    }
}

/// Concurrent mapping from RNTI to session record; the authoritative source
/// of "does this user exist". One reader-writer lock protects membership:
/// the per-TTI pipelines and event callbacks take the shared form, admission
/// and removal take the exclusive form. The per-record mutex only serializes
/// access to one record's state and is never held across a collaborator call.
pub struct UeRegistry {
    maps: RwLock<Maps>,
    /// Cyclic identifier allocation is independent of registry membership and
    /// uses its own lock
    rnti_counter: Mutex<Rnti>,
    max_nof_ues: usize,
}

impl UeRegistry {
    pub fn new(max_nof_ues: usize) -> Self {
        UeRegistry {
            maps: RwLock::new(Maps {
                active: HashMap::new(),
                draining: HashMap::new(),
            }),
            rnti_counter: Mutex::new(RNTI_ALLOC_START),
            max_nof_ues: max_nof_ues,
        }
    }

    /// Hand out the next identifier, wrapping back to the range start
    pub fn allocate_rnti(&self) -> Rnti {
        let mut counter = self.rnti_counter.lock().expect("rnti lock poisoned");
        let rnti = *counter;
        *counter += 1;
        if *counter >= RNTI_ALLOC_END {
            *counter = RNTI_ALLOC_START;
        }
        rnti
    }

    /// Shared-lock view for the per-TTI pipelines. Callers must not invoke
    /// collaborator services while holding the guard.
    pub fn read(&self) -> RwLockReadGuard<'_, Maps> {
        self.maps.read().expect("registry lock poisoned")
    }

    pub fn nof_active(&self) -> usize {
        self.read().active.len()
    }

    pub fn is_full(&self) -> bool {
        self.nof_active() >= self.max_nof_ues
    }

    pub fn max_nof_ues(&self) -> usize {
        self.max_nof_ues
    }

    pub fn classify(&self, rnti: Rnti) -> UeState {
        let maps = self.read();
        if maps.active.contains_key(&rnti) {
            UeState::Active
        } else if maps.draining.contains_key(&rnti) {
            UeState::Draining
        } else {
            UeState::Unknown
        }
    }

    /// Admit a record under the exclusive lock
    pub fn insert(&self, ue: UeContext) {
        let rnti = ue.rnti();
        let mut maps = self.maps.write().expect("registry lock poisoned");
        if maps.active.insert(rnti, Mutex::new(ue)).is_some() {
            tracing::warn!("insert: replaced existing session rnti=0x{:x}", rnti);
        } else {
            tracing::debug!("insert: admitted rnti=0x{:x} ({} active)", rnti, maps.active.len());
        }
    }

    /// Run `f` against one active record under the shared lock
    pub fn with_ue<R>(&self, rnti: Rnti, f: impl FnOnce(&mut UeContext) -> R) -> Result<R, MacError> {
        let maps = self.read();
        match maps.get_active(rnti) {
            Some(cell) => {
                let mut ue = cell.lock().expect("session lock poisoned");
                Ok(f(&mut ue))
            }
            None => Err(MacError::NotFound { rnti }),
        }
    }

    /// Run `f` for every active record under the shared lock
    pub fn for_each_active(&self, mut f: impl FnMut(Rnti, &mut UeContext)) {
        let maps = self.read();
        for (&rnti, cell) in maps.iter_active() {
            let mut ue = cell.lock().expect("session lock poisoned");
            f(rnti, &mut ue);
        }
    }

    /// Move a record from active to the pending-removal set. Synchronous and
    /// safe for concurrent readers; the record is destroyed later by
    /// `finish_removal` once the grace period has elapsed.
    pub fn begin_removal(&self, rnti: Rnti) -> Result<(), MacError> {
        let mut maps = self.maps.write().expect("registry lock poisoned");
        match maps.active.remove(&rnti) {
            Some(ue) => {
                maps.draining.insert(rnti, ue);
                Ok(())
            }
            None => Err(MacError::NotFound { rnti }),
        }
    }

    /// Destroy a draining record. Idempotent: a stale grace-period task for a
    /// long-gone identifier is a no-op.
    pub fn finish_removal(&self, rnti: Rnti) -> bool {
        let mut maps = self.maps.write().expect("registry lock poisoned");
        maps.draining.remove(&rnti).is_some()
    }

    pub fn clear(&self) {
        let mut maps = self.maps.write().expect("registry lock poisoned");
        maps.active.clear();
        maps.draining.clear();
    }
}
