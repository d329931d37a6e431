//! In-flight call registry

use super::call::CallId;
use crate::error::ServiceRef;
use crate::transport::CallControl;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct CallEntry {
    pub service: ServiceRef,
    pub description: String,
    pub is_processing: bool,
    pub remaining_automatic_retries: u32,
    pub control: CallControl,
    pub demo: bool,
}

/// Snapshot of a registered call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    pub id: CallId,
    pub service: ServiceRef,
    pub description: String,
    pub is_processing: bool,
    pub remaining_automatic_retries: u32,
    pub sent_in_demo_mode: bool,
}

/// Why a retry was not scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryRefusal {
    Unregistered,
    StillProcessing,
    Exhausted,
}

#[derive(Debug, Default)]
pub(crate) struct CallRegistry {
    calls: Mutex<HashMap<CallId, CallEntry>>,
    next_id: AtomicU64,
}

impl CallRegistry {
    pub fn next_id(&self) -> CallId {
        CallId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn register(&self, id: CallId, entry: CallEntry) {
        self.calls.lock().insert(id, entry);
    }

    pub fn remove(&self, id: CallId) -> Option<CallEntry> {
        self.calls.lock().remove(&id)
    }

    pub fn set_processing(&self, id: CallId, processing: bool) {
        if let Some(entry) = self.calls.lock().get_mut(&id) {
            entry.is_processing = processing;
        }
    }

    pub fn remaining_retries(&self, id: CallId) -> u32 {
        self.calls
            .lock()
            .get(&id)
            .map(|entry| entry.remaining_automatic_retries)
            .unwrap_or(0)
    }

    /// Consume one automatic retry. Refused while the previous attempt is
    /// still processing or when no retries are left.
    pub fn begin_retry(&self, id: CallId) -> Result<u32, RetryRefusal> {
        let mut calls = self.calls.lock();
        let entry = calls.get_mut(&id).ok_or(RetryRefusal::Unregistered)?;
        if entry.is_processing {
            return Err(RetryRefusal::StillProcessing);
        }
        if entry.remaining_automatic_retries == 0 {
            return Err(RetryRefusal::Exhausted);
        }
        entry.remaining_automatic_retries -= 1;
        Ok(entry.remaining_automatic_retries)
    }

    pub fn control(&self, id: CallId) -> Option<CallControl> {
        self.calls.lock().get(&id).map(|entry| entry.control.clone())
    }

    pub fn controls_for(&self, service: &ServiceRef) -> Vec<CallControl> {
        self.calls
            .lock()
            .values()
            .filter(|entry| &entry.service == service)
            .map(|entry| entry.control.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn snapshot(&self) -> Vec<PendingCall> {
        let mut pending: Vec<PendingCall> = self
            .calls
            .lock()
            .iter()
            .map(|(id, entry)| PendingCall {
                id: *id,
                service: entry.service.clone(),
                description: entry.description.clone(),
                is_processing: entry.is_processing,
                remaining_automatic_retries: entry.remaining_automatic_retries,
                sent_in_demo_mode: entry.demo,
            })
            .collect();
        pending.sort_by_key(|call| call.id);
        pending
    }
}
