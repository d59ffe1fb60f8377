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

use crate::rpc::filter::Filter;
use crate::rpc::{Invocation, Invoker, RemoteException, RpcResult, RUNTIME_EXCEPTION};
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use tracing::error;

/// Turns provider-side failures into exception results so that consumers
/// see them as service exceptions instead of transport errors.
#[derive(Debug, Default)]
pub struct ExceptionFilter;

#[async_trait]
impl Filter for ExceptionFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        match next.invoke(invocation).await {
            Err(err) if matches!(err.kind(), RpcErrorKind::Biz | RpcErrorKind::Unknown) => {
                error!(
                    service = next.interface(),
                    method = invocation.method_name(),
                    error = %err,
                    "got unchecked and undeclared exception"
                );
                Ok(RpcResult::from_exception(RemoteException::new(
                    RUNTIME_EXCEPTION,
                    err.to_string(),
                )))
            }
            other => other,
        }
    }
}
