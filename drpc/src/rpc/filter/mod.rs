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

//! Invocation filters.
//!
//! Filters intercept invocations on both sides. They are activated per side
//! by [`ProtocolFilterWrapper`](crate::rpc::ProtocolFilterWrapper) and
//! chained so that the first activated filter sees the call first.

mod active_limit;
mod echo;
mod exception;
mod timeout;
mod token;

pub use active_limit::ActiveLimitFilter;
pub use echo::EchoFilter;
pub use exception::ExceptionFilter;
pub use timeout::TimeoutFilter;
pub use token::TokenFilter;

use crate::common::{HasUrl, Url};
use crate::rpc::{Invocation, Invoker, RpcResult};
use crate::spi;
use crate::RpcError;
use async_trait::async_trait;
use std::sync::Arc;

/// Intercepts an invocation before it reaches `next`.
#[spi(name = "drpc.rpc.Filter")]
#[async_trait]
pub trait Filter: Send + Sync {
    /// Handles `invocation`, usually by calling `next.invoke`.
    ///
    /// # Errors
    ///
    /// Errors of `next`, or the filter's own refusal.
    async fn invoke(&self, next: &dyn Invoker, invocation: &Invocation) -> Result<RpcResult, RpcError>;
}

struct FilterNode {
    filter: Arc<dyn Filter>,
    next: Arc<dyn Invoker>,
    origin: Arc<dyn Invoker>,
}

impl HasUrl for FilterNode {
    fn url(&self) -> &Url {
        self.origin.url()
    }
}

#[async_trait]
impl Invoker for FilterNode {
    fn interface(&self) -> &str {
        self.origin.interface()
    }

    fn is_available(&self) -> bool {
        self.origin.is_available()
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        self.filter.invoke(&*self.next, invocation).await
    }

    fn destroy(&self) {
        self.origin.destroy();
    }
}

/// Chains `filters` around `invoker`, the first filter outermost.
pub fn build_chain(invoker: Arc<dyn Invoker>, filters: Vec<Arc<dyn Filter>>) -> Arc<dyn Invoker> {
    filters.into_iter().rev().fold(Arc::clone(&invoker), |next, filter| {
        Arc::new(FilterNode {
            filter,
            next,
            origin: Arc::clone(&invoker),
        }) as Arc<dyn Invoker>
    })
}
