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

use crate::common::{constants, local_host};
use crate::rpc::filter::Filter;
use crate::rpc::{Invocation, Invoker, RpcResult};
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;

/// Rejects invocations whose `token` attachment does not match the
/// provider's `token` parameter.
#[derive(Debug, Default)]
pub struct TokenFilter;

#[async_trait]
impl Filter for TokenFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        let url = next.url();
        if let Some(token) = url.parameter(constants::TOKEN_KEY) {
            if invocation.attachment(constants::TOKEN_KEY) != Some(token) {
                return Err(RpcError::new(
                    RpcErrorKind::Forbidden,
                    format!(
                        "Invalid token! Forbid invoke remote service {} method {}() from consumer to provider {}",
                        next.interface(),
                        invocation.method_name(),
                        local_host()
                    ),
                ));
            }
        }
        next.invoke(invocation).await
    }
}
