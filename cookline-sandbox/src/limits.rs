//! Per-call resource limits and memory accounting.

use crate::error::{FaultKind, SandboxError, SandboxResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Resource limits for one formula evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Ceiling on memory charged by allocations, in bytes.
    pub max_memory_bytes: usize,
    /// Evaluation steps allowed per call (prevents infinite loops).
    pub fuel_per_call: u64,
    /// Wall-clock budget per call in milliseconds.
    pub timeout_ms: u64,
    /// Longest accepted source, in characters.
    pub max_source_len: usize,
    /// Largest accepted serialized return value, in bytes.
    pub max_result_bytes: usize,
    /// Sandboxes allowed to run at once.
    pub max_concurrent: usize,
}

impl ResourceLimits {
    pub fn formula_default() -> Self {
        Self {
            max_memory_bytes: 8 * 1024 * 1024, // 8MB
            fuel_per_call: 2_000_000,
            timeout_ms: 300,
            max_source_len: 10_000,
            max_result_bytes: 64 * 1024,
            max_concurrent: 8,
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::formula_default()
    }
}

/// Tracks memory charged by a running formula against its ceiling.
///
/// Every allocation is charged. The interpreter periodically re-measures
/// what is still reachable and resets the current figure with
/// [`TrackingLimiter::reset_to`]; the peak is kept across resets.
pub struct TrackingLimiter {
    max_memory: usize,
    current_memory: AtomicUsize,
    peak_memory: AtomicUsize,
}

impl TrackingLimiter {
    pub fn new(max_memory: usize) -> Self {
        Self {
            max_memory,
            current_memory: AtomicUsize::new(0),
            peak_memory: AtomicUsize::new(0),
        }
    }

    /// Records an allocation of `bytes`, failing once the ceiling is passed.
    pub fn charge(&self, bytes: usize) -> SandboxResult<()> {
        let desired = self.current_memory.load(Ordering::Relaxed).saturating_add(bytes);
        if desired > self.max_memory {
            debug!(
                desired = desired,
                max = self.max_memory,
                "Memory charge denied - would exceed limit"
            );
            return Err(self.limit_error());
        }
        self.current_memory.store(desired, Ordering::Relaxed);
        self.peak_memory.fetch_max(desired, Ordering::Relaxed);
        Ok(())
    }

    /// Replaces the current figure with a fresh measurement of live memory.
    pub fn reset_to(&self, live_bytes: usize) {
        self.current_memory.store(live_bytes, Ordering::Relaxed);
        self.peak_memory.fetch_max(live_bytes, Ordering::Relaxed);
    }

    pub fn peak_memory_bytes(&self) -> usize {
        self.peak_memory.load(Ordering::Relaxed)
    }

    pub fn current_memory_bytes(&self) -> usize {
        self.current_memory.load(Ordering::Relaxed)
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory
    }

    /// Bytes that can still be charged before the ceiling.
    pub fn remaining_bytes(&self) -> usize {
        self.max_memory.saturating_sub(self.current_memory_bytes())
    }

    /// The fault raised when a charge would pass the ceiling.
    pub fn limit_error(&self) -> SandboxError {
        SandboxError::fault(FaultKind::MemoryLimit {
            limit_bytes: self.max_memory,
        })
    }
}
