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

//! Service discovery.
//!
//! Providers [`register`](Registry::register) their URLs; consumers
//! [`subscribe`](Registry::subscribe) and receive whole snapshots of the
//! matching URLs through a [`NotifyListener`]. The `registry` protocol ties
//! discovery into export and refer: exporting registers the provider, and a
//! reference becomes a cluster invoker over a [`RegistryDirectory`].

mod directory;
mod memory;
mod protocol;

pub use directory::RegistryDirectory;
pub use memory::{MemoryRegistry, MemoryRegistryFactory};
pub use protocol::RegistryProtocol;

use crate::common::{constants, HasUrl, Url};
use crate::spi;
use crate::RpcError;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives discovery snapshots.
#[async_trait]
pub trait NotifyListener: Send + Sync + 'static {
    /// Every URL currently matching the subscription. A category without
    /// URLs is reported as a single `empty://` URL of that category.
    async fn notify(&self, urls: Vec<Url>);
}

/// A discovery source.
#[async_trait]
pub trait Registry: HasUrl + Send + Sync + 'static {
    /// Whether the registry can currently be reached.
    fn is_available(&self) -> bool;

    /// Publishes `url`.
    ///
    /// # Errors
    ///
    /// Registry failures.
    async fn register(&self, url: &Url) -> Result<(), RpcError>;

    /// Withdraws `url`.
    ///
    /// # Errors
    ///
    /// Registry failures.
    async fn unregister(&self, url: &Url) -> Result<(), RpcError>;

    /// Subscribes `listener` to the URLs matching `url`; the current
    /// snapshot is delivered before this returns.
    ///
    /// # Errors
    ///
    /// Registry failures.
    async fn subscribe(&self, url: &Url, listener: Arc<dyn NotifyListener>) -> Result<(), RpcError>;

    /// Ends a subscription made with [`subscribe`](Registry::subscribe).
    ///
    /// # Errors
    ///
    /// Registry failures.
    async fn unsubscribe(&self, url: &Url, listener: &Arc<dyn NotifyListener>) -> Result<(), RpcError>;

    /// The registered URLs matching `url`.
    ///
    /// # Errors
    ///
    /// Registry failures.
    async fn lookup(&self, url: &Url) -> Result<Vec<Url>, RpcError>;

    /// Drops every registration and subscription.
    fn destroy(&self) {}
}

/// Connects to registries; the adaptive factory dispatches on the URL
/// scheme.
#[spi(name = "drpc.registry.RegistryFactory", default = "memory")]
pub trait RegistryFactory: Send + Sync {
    /// The registry at `url`, shared by every caller naming the same
    /// address.
    ///
    /// # Errors
    ///
    /// Connection failures.
    #[adaptive("protocol")]
    fn get_registry(&self, url: &Url) -> Result<Arc<dyn Registry>, RpcError>;
}

fn list_contains(list: &str, item: &str) -> bool {
    list.split(',').map(str::trim).any(|candidate| candidate == item)
}

/// Whether the provider or router URL `provider` answers the subscription
/// `consumer`: same interface, a subscribed category, enabled, and matching
/// group and version (`*` matches anything, lists match any member).
pub fn is_match(consumer: &Url, provider: &Url) -> bool {
    let consumer_interface = consumer.service_interface();
    if consumer_interface != constants::ANY_VALUE && consumer_interface != provider.service_interface() {
        return false;
    }

    let category = provider.parameter_or(constants::CATEGORY_KEY, constants::DEFAULT_CATEGORY);
    let subscribed = consumer.parameter_or(constants::CATEGORY_KEY, constants::DEFAULT_CATEGORY);
    if subscribed != constants::ANY_VALUE && !list_contains(subscribed, category) {
        return false;
    }

    if !provider.get(constants::ENABLED_KEY, true)
        && consumer.parameter(constants::ENABLED_KEY) != Some(constants::ANY_VALUE)
    {
        return false;
    }

    let consumer_group = consumer.parameter_or(constants::GROUP_KEY, "");
    let provider_group = provider.parameter_or(constants::GROUP_KEY, "");
    let group_matches = consumer_group == constants::ANY_VALUE
        || consumer_group == provider_group
        || list_contains(consumer_group, provider_group);

    let consumer_version = consumer.version();
    let version_matches = consumer_version == constants::ANY_VALUE || consumer_version == provider.version();

    group_matches && version_matches
}
