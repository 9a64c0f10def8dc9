//! Adapter registry: venue → adapter lookup (spec §4.1 fan-out point).
//!
//! Every component above this crate (position exit monitor, trigger
//! detector, position closer) needs to resolve a `Venue` to the adapter
//! instance that talks to it. This is a thin `DashMap` wrapper, generic
//! over the single concrete adapter type a deployment runs, mirroring
//! the per-symbol sharded-map pattern used by `memo::TtlCache`.

use std::sync::Arc;

use dashmap::DashMap;
use fra_core::ids::Venue;

use crate::adapter::ExchangeAdapter;

pub struct AdapterRegistry<A: ExchangeAdapter> {
    adapters: DashMap<Venue, Arc<A>>,
}

impl<A: ExchangeAdapter> AdapterRegistry<A> {
    pub fn new() -> Self {
        Self { adapters: DashMap::new() }
    }

    pub fn register(&self, adapter: Arc<A>) {
        self.adapters.insert(adapter.venue().clone(), adapter);
    }

    pub fn get(&self, venue: &Venue) -> Option<Arc<A>> {
        self.adapters.get(venue).map(|e| e.clone())
    }

    pub fn venues(&self) -> Vec<Venue> {
        self.adapters.iter().map(|e| e.key().clone()).collect()
    }
}

impl<A: ExchangeAdapter> Default for AdapterRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}
