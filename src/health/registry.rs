//! Process-wide warnable registry.
//!
//! # Responsibilities
//! - Hold every registered [`Warnable`] for the process lifetime
//! - Guarantee code uniqueness
//!
//! # Design Decisions
//! - Populated during serial startup; lookups may run concurrently
//! - Duplicate codes are a programming error and panic
//! - Removal exists only for test teardown

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::health::warnable::{Warnable, WarnableCode};

static REGISTERED: Lazy<DashMap<WarnableCode, Arc<Warnable>>> = Lazy::new(DashMap::new);

/// Register a warnable and return the shared handle trackers are given.
///
/// # Panics
/// If a warnable with the same code is already registered.
pub fn register(warnable: Warnable) -> Arc<Warnable> {
    let code = warnable.code.clone();
    match REGISTERED.entry(code) {
        Entry::Occupied(existing) => {
            let code = existing.key().clone();
            drop(existing);
            tracing::error!(warnable = %code, "Duplicate warnable registration");
            panic!("duplicate warnable registration: {code}");
        }
        Entry::Vacant(slot) => {
            let warnable = Arc::new(warnable);
            slot.insert(warnable.clone());
            tracing::trace!(warnable = %warnable.code, "Warnable registered");
            warnable
        }
    }
}

/// Look up a registered warnable by code.
pub fn registered(code: &WarnableCode) -> Option<Arc<Warnable>> {
    REGISTERED.get(code).map(|r| r.value().clone())
}

/// All registered codes, ascending.
pub fn registered_codes() -> Vec<WarnableCode> {
    let mut codes: Vec<_> = REGISTERED.iter().map(|r| r.key().clone()).collect();
    codes.sort();
    codes
}

#[cfg(test)]
pub(crate) fn unregister(warnable: &Warnable) {
    REGISTERED.remove(&warnable.code);
}
