//! Tile load state machine.
//!
//! Each tile carries its status in an atomic cell. Transitions are
//! compare-and-swap operations validated against a fixed legality table, so
//! the loader, the eviction sweep, and external abort requests can race
//! without a lock.
//!
//! # States
//!
//! ```text
//! UNLOADED → REQUESTED → {QUEUED_CACHE, QUEUED_NET}
//!          → {LOADING_CACHE, LOADING_NET} → READY | ERROR
//! ```
//!
//! plus `ABORTING` (reachable from any in-flight state) and `EVICTING`
//! (transient during reclamation, returns to `UNLOADED`).
//!
//! `ABORTING` is sticky: once set, the only permitted exit is the loader's
//! own cleanup path settling the tile back to `UNLOADED`. In particular an
//! aborting tile can never become `READY`.

use std::sync::atomic::{AtomicU8, Ordering};

// =============================================================================
// Status
// =============================================================================

/// Load status of a tile. See the module docs for the transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TileStatus {
    /// No payload and no load attempt in progress.
    Unloaded = 0,
    /// A load attempt has claimed the tile but not yet routed it.
    Requested = 1,
    /// Routed to the cache path, waiting for a read slot.
    QueuedCache = 2,
    /// Routed to the network path, waiting for a fetch slot.
    QueuedNet = 3,
    /// Reading and decoding from the on-disk cache.
    LoadingCache = 4,
    /// Fetching and decoding from the network.
    LoadingNet = 5,
    /// Decoded pixels are available.
    Ready = 6,
    /// The last load attempt failed; sticky until re-requested.
    Error = 7,
    /// Cancellation requested; the loader unwinds at the next chunk boundary.
    Aborting = 8,
    /// Reclamation in progress; returns to `Unloaded`.
    Evicting = 9,
}

impl TileStatus {
    fn from_u8(v: u8) -> TileStatus {
        match v {
            0 => TileStatus::Unloaded,
            1 => TileStatus::Requested,
            2 => TileStatus::QueuedCache,
            3 => TileStatus::QueuedNet,
            4 => TileStatus::LoadingCache,
            5 => TileStatus::LoadingNet,
            6 => TileStatus::Ready,
            7 => TileStatus::Error,
            8 => TileStatus::Aborting,
            _ => TileStatus::Evicting,
        }
    }

    /// True for states between a claim and its terminal outcome.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            TileStatus::Requested
                | TileStatus::QueuedCache
                | TileStatus::QueuedNet
                | TileStatus::LoadingCache
                | TileStatus::LoadingNet
        )
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            TileStatus::Unloaded => "unloaded",
            TileStatus::Requested => "requested",
            TileStatus::QueuedCache => "queued-cache",
            TileStatus::QueuedNet => "queued-net",
            TileStatus::LoadingCache => "loading-cache",
            TileStatus::LoadingNet => "loading-net",
            TileStatus::Ready => "ready",
            TileStatus::Error => "error",
            TileStatus::Aborting => "aborting",
            TileStatus::Evicting => "evicting",
        }
    }
}

/// Whether `from → to` is a legal transition.
///
/// This is the single source of truth for the state machine; every mutation
/// of a [`StatusCell`] goes through it.
pub fn transition_allowed(from: TileStatus, to: TileStatus) -> bool {
    use TileStatus::*;
    match (from, to) {
        // Claiming a load attempt. Error is re-enterable on explicit re-request.
        (Unloaded, Requested) | (Error, Requested) => true,

        // Routing decided by the cache probe.
        (Requested, QueuedCache) | (Requested, QueuedNet) => true,

        // Cache path; decode/read failure falls back to the network.
        (QueuedCache, LoadingCache) => true,
        (LoadingCache, Ready) | (LoadingCache, QueuedNet) => true,

        // Network path.
        (QueuedNet, LoadingNet) => true,
        (LoadingNet, Ready) | (LoadingNet, Error) => true,

        // Cancellation from any in-flight state; settles to Unloaded only.
        (f, Aborting) if f.is_in_flight() => true,
        (Aborting, Unloaded) => true,

        // Reclamation.
        (Ready, Evicting) => true,
        (Evicting, Unloaded) => true,

        _ => false,
    }
}

// =============================================================================
// Status Cell
// =============================================================================

/// Atomic holder for a tile's [`TileStatus`].
///
/// All mutation is CAS-based and validated by [`transition_allowed`], so a
/// racing abort can never be overwritten by a slower loader completion.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    /// Create a cell in the `Unloaded` state.
    pub fn new() -> Self {
        Self(AtomicU8::new(TileStatus::Unloaded as u8))
    }

    /// Create a cell already in `status`. Construction only; derived tiles
    /// are born `Ready`.
    pub(crate) fn new_in(status: TileStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    /// Current status.
    pub fn get(&self) -> TileStatus {
        TileStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Attempt the transition `from → to`.
    ///
    /// Fails (returns `false`) if the transition is illegal or if the cell
    /// no longer holds `from` - e.g. because an abort raced in.
    pub fn try_transition(&self, from: TileStatus, to: TileStatus) -> bool {
        if !transition_allowed(from, to) {
            return false;
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Request cancellation. Succeeds only for in-flight states; `Aborting`
    /// itself is left untouched (idempotent).
    pub fn request_abort(&self) -> bool {
        let mut current = self.get();
        loop {
            if current == TileStatus::Aborting {
                return true;
            }
            if !current.is_in_flight() {
                return false;
            }
            match self.0.compare_exchange(
                current as u8,
                TileStatus::Aborting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(v) => current = TileStatus::from_u8(v),
            }
        }
    }

    /// Loader cleanup: settle an aborted tile back to `Unloaded`.
    pub fn settle_abort(&self) -> bool {
        self.try_transition(TileStatus::Aborting, TileStatus::Unloaded)
    }

    /// True when cancellation has been requested.
    pub fn is_aborting(&self) -> bool {
        self.get() == TileStatus::Aborting
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
