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

//! Directories: the live candidate lists cluster invokers choose from.

use crate::cluster::{route, Router};
use crate::common::{HasUrl, Url};
use crate::rpc::{Invocation, Invoker};
use crate::{RpcError, RpcErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A live list of the invokers able to serve one reference.
///
/// Successive calls to [`list`](Directory::list) may return different
/// contents as providers come and go. Every call returns an owned snapshot:
/// later updates never change a list already handed out.
pub trait Directory: HasUrl + Send + Sync + 'static {
    /// The served interface name.
    fn interface(&self) -> &str;

    /// The candidates for `invocation`, after routing.
    ///
    /// # Errors
    ///
    /// Fails once the directory is destroyed.
    fn list(&self, invocation: &Invocation) -> Result<Vec<Arc<dyn Invoker>>, RpcError>;

    /// Whether any candidate can currently take calls.
    fn is_available(&self) -> bool;

    /// Whether [`destroy`](Directory::destroy) has run.
    fn is_destroyed(&self) -> bool;

    /// Destroys the directory and the invokers it owns.
    fn destroy(&self);
}

pub(crate) fn destroyed_error(url: &Url) -> RpcError {
    RpcError::new(
        RpcErrorKind::Unknown,
        format!("Directory already destroyed .url: {url}"),
    )
}

/// A directory over a fixed list of invokers.
///
/// # Examples
///
/// ```rust,no_run
/// use drpc::cluster::{Directory, StaticDirectory};
/// use drpc::common::Url;
/// use drpc::rpc::Invoker;
/// use std::sync::Arc;
///
/// fn pin(invokers: Vec<Arc<dyn Invoker>>) -> Arc<dyn Directory> {
///     let url = Url::parse("dubbo://127.0.0.1/acme.Greeter?cluster=failfast").unwrap();
///     Arc::new(StaticDirectory::new(url, invokers))
/// }
/// ```
pub struct StaticDirectory {
    url: Url,
    interface: String,
    invokers: Vec<Arc<dyn Invoker>>,
    routers: Vec<Arc<dyn Router>>,
    destroyed: AtomicBool,
}

impl StaticDirectory {
    /// A directory serving `invokers` under `url`.
    pub fn new(url: Url, invokers: Vec<Arc<dyn Invoker>>) -> Self {
        let interface = invokers
            .first()
            .map(|invoker| invoker.interface().to_string())
            .unwrap_or_else(|| url.service_interface().to_string());
        Self {
            url,
            interface,
            invokers,
            routers: Vec::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Applies `routers` to every listing, highest priority first.
    #[must_use]
    pub fn with_routers(mut self, mut routers: Vec<Arc<dyn Router>>) -> Self {
        routers.sort_by_key(|router| std::cmp::Reverse(router.priority()));
        self.routers = routers;
        self
    }
}

impl HasUrl for StaticDirectory {
    fn url(&self) -> &Url {
        &self.url
    }
}

impl Directory for StaticDirectory {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn list(&self, invocation: &Invocation) -> Result<Vec<Arc<dyn Invoker>>, RpcError> {
        if self.is_destroyed() {
            return Err(destroyed_error(&self.url));
        }
        Ok(route(&self.routers, self.invokers.clone(), &self.url, invocation))
    }

    fn is_available(&self) -> bool {
        !self.is_destroyed() && self.invokers.iter().any(|invoker| invoker.is_available())
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        for invoker in &self.invokers {
            invoker.destroy();
        }
    }
}
