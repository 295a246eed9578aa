// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Per-object caches of native views.
//!
//! Every buffer and texture owns one cache.  The cache is the only state shared
//! between command lists recording on different threads, so it is guarded by
//! its own mutex.  The lock is held across lookup-or-create, which makes view
//! creation at-most-once per key even when two threads race for the same key.
//!
//! Entries live as long as the owning object; they are handed back to the
//! owner with [`ViewCache::drain`] when it is dropped.

use crate::error::Error;
use crate::imp::NativeView;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Mutex;

#[derive(Debug)]
pub(crate) struct ViewCache<Key> {
    views: Mutex<HashMap<Key, NativeView>>,
}

impl<Key: Copy + Eq + Hash + Debug> ViewCache<Key> {
    pub fn new() -> Self {
        ViewCache {
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the view for `key`, creating it with `create` on first use.
    ///
    /// A failed creation caches nothing, so a later call retries.
    pub fn get_or_create<F>(&self, key: Key, create: F) -> Result<NativeView, Error>
    where
        F: FnOnce() -> Result<NativeView, Error>,
    {
        let mut views = self.views.lock().expect("view cache poisoned");
        if let Some(view) = views.get(&key) {
            return Ok(*view);
        }
        let view = create()?;
        logwise::trace_sync!(
            "created view {view} for {key}",
            view = logwise::privacy::LogIt(&view),
            key = logwise::privacy::LogIt(&key)
        );
        views.insert(key, view);
        Ok(view)
    }

    pub fn len(&self) -> usize {
        self.views.lock().expect("view cache poisoned").len()
    }

    /// Removes every entry, returning the views so the owner can destroy them.
    pub fn drain(&mut self) -> Vec<NativeView> {
        let views = match self.views.get_mut() {
            Ok(views) => views,
            Err(poisoned) => poisoned.into_inner(),
        };
        views.drain().map(|(_, view)| view).collect()
    }
}
