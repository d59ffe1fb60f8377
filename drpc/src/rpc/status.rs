//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Outstanding-call counters per URL and per URL and method.

use crate::common::Url;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Call statistics for one URL or one URL and method.
#[derive(Debug, Default)]
pub struct RpcStatus {
    active: AtomicI64,
    total: AtomicU64,
    failed: AtomicU64,
    total_elapsed_ms: AtomicU64,
    released: Notify,
}

fn url_statuses() -> &'static DashMap<String, Arc<RpcStatus>> {
    static STATUSES: OnceLock<DashMap<String, Arc<RpcStatus>>> = OnceLock::new();
    STATUSES.get_or_init(DashMap::new)
}

fn method_statuses() -> &'static DashMap<String, Arc<RpcStatus>> {
    static STATUSES: OnceLock<DashMap<String, Arc<RpcStatus>>> = OnceLock::new();
    STATUSES.get_or_init(DashMap::new)
}

impl RpcStatus {
    /// Statistics of all methods on `url`.
    pub fn of(url: &Url) -> Arc<RpcStatus> {
        let key = url.to_identity_string();
        Arc::clone(url_statuses().entry(key).or_default().value())
    }

    /// Statistics of `method` on `url`.
    pub fn of_method(url: &Url, method: &str) -> Arc<RpcStatus> {
        let key = format!("{}#{method}", url.to_identity_string());
        Arc::clone(method_statuses().entry(key).or_default().value())
    }

    /// Records the start of a call.
    pub fn begin_count(url: &Url, method: &str) {
        Self::of(url).active.fetch_add(1, Ordering::AcqRel);
        Self::of_method(url, method).active.fetch_add(1, Ordering::AcqRel);
    }

    /// Records the end of a call.
    pub fn end_count(url: &Url, method: &str, elapsed: Duration, succeeded: bool) {
        for status in [Self::of(url), Self::of_method(url, method)] {
            status.active.fetch_sub(1, Ordering::AcqRel);
            status.total.fetch_add(1, Ordering::Relaxed);
            status
                .total_elapsed_ms
                .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
            if !succeeded {
                status.failed.fetch_add(1, Ordering::Relaxed);
            }
            status.released.notify_waiters();
        }
    }

    /// Completes when any call on this status ends.
    pub fn released(&self) -> Notified<'_> {
        self.released.notified()
    }

    /// Calls in flight.
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Acquire)
    }

    /// Completed calls.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Completed calls that failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Mean duration of completed calls.
    pub fn average_elapsed(&self) -> Duration {
        let total = self.total();
        if total == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.total_elapsed_ms.load(Ordering::Relaxed) / total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_method() {
        let url = Url::parse("dubbo://10.9.9.9:1/status.Test").unwrap();
        RpcStatus::begin_count(&url, "a");
        RpcStatus::begin_count(&url, "b");
        assert_eq!(RpcStatus::of(&url).active(), 2);
        assert_eq!(RpcStatus::of_method(&url, "a").active(), 1);

        RpcStatus::end_count(&url, "a", Duration::from_millis(4), false);
        assert_eq!(RpcStatus::of_method(&url, "a").active(), 0);
        assert_eq!(RpcStatus::of_method(&url, "a").failed(), 1);
        assert_eq!(RpcStatus::of(&url).active(), 1);
        RpcStatus::end_count(&url, "b", Duration::from_millis(2), true);
    }
}
