//! Memory pressure sampling and render-size throttling.
//!
//! [`MemoryMonitor`] is constructed once by the application and shared by
//! handle. It samples a [`HostMemory`] capability, keeps the latest sample,
//! and pushes each sample to subscribers while monitoring runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use sysinfo::System;

use crate::task::TaskHandle;

pub const DEFAULT_BYTES_PER_ITEM: u64 = 1024;

const HIGH_MEMORY_PERCENT: f64 = 60.0;
const LOW_MEMORY_PERCENT: f64 = 80.0;
const OPERATION_CEILING_PERCENT: f64 = 90.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Raw usage reported by the host, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub limit_bytes: u64,
}

/// Host memory introspection.
pub trait HostMemory: Send + Sync {
    /// `None` when the host cannot report memory usage.
    fn heap_usage(&self) -> Option<HeapUsage>;
}

/// Host memory read through `sysinfo`.
///
/// `used` is memory in use by processes, `total` additionally counts
/// reclaimable buffers and caches, `limit` is physical memory.
pub struct SystemMemory {
    system: Mutex<System>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMemory for SystemMemory {
    fn heap_usage(&self) -> Option<HeapUsage> {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_memory();

        let limit_bytes = system.total_memory();
        if limit_bytes == 0 {
            tracing::debug!(target = "concierge.memory", "host reported no physical memory");
            return None;
        }
        Some(HeapUsage {
            used_bytes: system.used_memory(),
            total_bytes: limit_bytes.saturating_sub(system.free_memory()),
            limit_bytes,
        })
    }
}

/// For hosts without memory introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableMemory;

impl HostMemory for UnavailableMemory {
    fn heap_usage(&self) -> Option<HeapUsage> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub used_mb: f64,
    pub total_mb: f64,
    pub limit_mb: f64,
    pub usage_percentage: f64,
    /// Usage above 80%.
    pub is_low_memory: bool,
    /// Usage above 60%.
    pub is_high_memory: bool,
}

impl MemorySample {
    pub fn from_usage(usage: HeapUsage) -> Self {
        let usage_percentage = percent_of(usage.used_bytes as f64, usage.limit_bytes);
        Self {
            used_mb: usage.used_bytes as f64 / BYTES_PER_MB,
            total_mb: usage.total_bytes as f64 / BYTES_PER_MB,
            limit_mb: usage.limit_bytes as f64 / BYTES_PER_MB,
            usage_percentage,
            is_low_memory: usage_percentage > LOW_MEMORY_PERCENT,
            is_high_memory: usage_percentage > HIGH_MEMORY_PERCENT,
        }
    }

    pub fn recommended_display_limit(&self) -> usize {
        display_limit_for(self.usage_percentage)
    }
}

/// 250 items above 80% usage, 500 above 60%, 1000 otherwise.
pub fn display_limit_for(usage_percentage: f64) -> usize {
    if usage_percentage > LOW_MEMORY_PERCENT {
        250
    } else if usage_percentage > HIGH_MEMORY_PERCENT {
        500
    } else {
        1000
    }
}

fn percent_of(value: f64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    value * 100.0 / limit as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryWarning {
    High,
    Low,
}

impl MemoryWarning {
    pub fn for_sample(sample: &MemorySample) -> Option<Self> {
        if sample.is_low_memory {
            Some(MemoryWarning::Low)
        } else if sample.is_high_memory {
            Some(MemoryWarning::High)
        } else {
            None
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            MemoryWarning::High => "Memory usage is high; large lists are shortened.",
            MemoryWarning::Low => "Memory is running low; close unused views to keep the panel responsive.",
        }
    }
}

type MemoryListener = Arc<dyn Fn(&MemorySample) + Send + Sync>;

struct Inner {
    host: Arc<dyn HostMemory>,
    latest: Mutex<Option<MemorySample>>,
    listeners: Mutex<HashMap<u64, MemoryListener>>,
    next_id: AtomicU64,
}

impl Inner {
    fn listeners(&self) -> MutexGuard<'_, HashMap<u64, MemoryListener>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sample(&self) -> Option<MemorySample> {
        let sample = self.host.heap_usage().map(MemorySample::from_usage);
        *self
            .latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = sample;
        sample
    }
}

#[derive(Clone)]
pub struct MemoryMonitor {
    inner: Arc<Inner>,
}

impl MemoryMonitor {
    pub fn new(host: Arc<dyn HostMemory>) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                latest: Mutex::new(None),
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Sample the host now.
    pub fn memory_info(&self) -> Option<MemorySample> {
        self.inner.sample()
    }

    /// The sample taken by the last call or monitoring tick.
    pub fn latest_sample(&self) -> Option<MemorySample> {
        *self
            .inner
            .latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether rendering `item_count` items of about 1 KiB each keeps usage
    /// at or under 90% of the limit.
    pub fn can_perform_operation(&self, item_count: u64) -> bool {
        self.can_perform_operation_with(item_count, DEFAULT_BYTES_PER_ITEM)
    }

    /// Permissive when the host cannot report memory.
    pub fn can_perform_operation_with(&self, item_count: u64, bytes_per_item: u64) -> bool {
        let Some(usage) = self.inner.host.heap_usage() else {
            return true;
        };
        let projected = usage
            .used_bytes
            .saturating_add(item_count.saturating_mul(bytes_per_item));
        percent_of(projected as f64, usage.limit_bytes) <= OPERATION_CEILING_PERCENT
    }

    /// 1000 when the host cannot report memory.
    pub fn recommended_display_limit(&self) -> usize {
        self.memory_info()
            .map_or(1000, |sample| sample.recommended_display_limit())
    }

    pub fn memory_warning(&self, sample: &MemorySample) -> Option<MemoryWarning> {
        MemoryWarning::for_sample(sample)
    }

    /// Call `listener` with every monitoring sample until the subscription
    /// is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> MemorySubscription
    where
        F: Fn(&MemorySample) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().insert(id, Arc::new(listener));
        MemorySubscription {
            id,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners().len()
    }

    /// Take one sample and push it to subscribers.
    pub fn tick(&self) -> Option<MemorySample> {
        let sample = self.inner.sample()?;
        if sample.is_low_memory {
            tracing::warn!(
                target = "concierge.memory",
                usage_percentage = sample.usage_percentage,
                used_mb = sample.used_mb,
                limit_mb = sample.limit_mb,
                "low memory"
            );
        }

        let listeners: Vec<MemoryListener> = self.inner.listeners().values().cloned().collect();
        for listener in listeners {
            listener(&sample);
        }
        Some(sample)
    }

    /// Sample every `interval` until the returned handle is dropped.
    pub fn start_monitoring(&self, interval: Duration) -> TaskHandle {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                MemoryMonitor { inner }.tick();
                tokio::time::sleep(interval).await;
            }
        });
        TaskHandle::new("memory-monitor", handle)
    }
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("latest", &self.latest_sample())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Listener registration returned by [`MemoryMonitor::subscribe`].
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct MemorySubscription {
    id: u64,
    monitor: Weak<Inner>,
}

impl MemorySubscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner.listeners().remove(&self.id);
        }
    }
}
