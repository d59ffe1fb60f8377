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

use crate::common::constants;
use crate::rpc::filter::Filter;
use crate::rpc::{Invocation, Invoker, RpcResult};
use crate::RpcError;
use async_trait::async_trait;

/// Answers `$echo` calls with their argument, so consumers can probe a
/// provider without knowing its methods.
#[derive(Debug, Default)]
pub struct EchoFilter;

#[async_trait]
impl Filter for EchoFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        if invocation.method_name() == constants::ECHO_METHOD && invocation.arguments().len() == 1 {
            return Ok(RpcResult::new(invocation.arguments()[0].clone()));
        }
        next.invoke(invocation).await
    }
}
