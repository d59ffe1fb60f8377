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

//! The outcome of an invocation.

use crate::rpc::Value;
use crate::{RpcError, RpcErrorKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Exception class reported when a provider refuses a call.
pub const FORBIDDEN_EXCEPTION: &str = "drpc.rpc.ForbiddenException";

/// Exception class reported for failures the service did not declare.
pub const RUNTIME_EXCEPTION: &str = "drpc.rpc.RuntimeException";

/// A failure raised by the service method on the provider, carried back to
/// the consumer inside a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteException {
    /// Exception class name.
    pub class: String,
    /// Human readable message.
    pub message: String,
}

impl RemoteException {
    /// Creates an exception.
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

impl std::error::Error for RemoteException {}

/// A result still on its way from the provider.
pub type AsyncResult = Pin<Box<dyn Future<Output = Result<RpcResult, RpcError>> + Send + 'static>>;

/// Return value or service exception of an invocation, plus attachments.
///
/// An asynchronous call (`async=true`) returns a pending result immediately;
/// [`resolve`](Self::resolve) waits for the provider's answer.
///
/// # Examples
///
/// ```rust
/// use drpc::rpc::{RemoteException, RpcResult, Value};
///
/// let ok = RpcResult::new(Value::from("hi"));
/// assert_eq!(ok.recreate().unwrap(), Value::from("hi"));
///
/// let failed = RpcResult::from_exception(RemoteException::new("acme.NotFound", "no such user"));
/// assert!(failed.recreate().unwrap_err().is_biz());
/// ```
#[derive(Default)]
pub struct RpcResult {
    value: Value,
    exception: Option<RemoteException>,
    attachments: BTreeMap<String, String>,
    // Locked so `RpcResult` stays `Sync`.
    pending: Mutex<Option<AsyncResult>>,
}

impl RpcResult {
    /// A successful result.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// A successful result without a value.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result carrying a service exception.
    pub fn from_exception(exception: RemoteException) -> Self {
        Self {
            exception: Some(exception),
            ..Self::default()
        }
    }

    /// A result to be completed by `future`.
    pub fn pending(future: AsyncResult) -> Self {
        Self {
            pending: Mutex::new(Some(future)),
            ..Self::default()
        }
    }

    /// The return value; `Null` while pending or when an exception is set.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The service exception, if any.
    pub fn exception(&self) -> Option<&RemoteException> {
        self.exception.as_ref()
    }

    /// Whether the service method failed.
    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// Whether the result is still on its way.
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// All attachments.
    pub fn attachments(&self) -> &BTreeMap<String, String> {
        &self.attachments
    }

    /// One attachment.
    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    /// Sets an attachment.
    pub fn set_attachment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attachments.insert(key.into(), value.into());
    }

    /// Replaces all attachments.
    pub fn set_attachments(&mut self, attachments: BTreeMap<String, String>) {
        self.attachments = attachments;
    }

    /// Waits for a pending result; completed results return immediately.
    ///
    /// # Errors
    ///
    /// Transport failures of the pending call.
    pub async fn resolve(mut self) -> Result<RpcResult, RpcError> {
        let pending = self.pending.get_mut().take();
        match pending {
            Some(pending) => pending.await,
            None => Ok(self),
        }
    }

    /// Returns the value, or the service exception as an error.
    ///
    /// # Errors
    ///
    /// [`RpcErrorKind::Biz`] for service exceptions and
    /// [`RpcErrorKind::Forbidden`] for refused calls. A pending result is an
    /// error; resolve it first.
    pub fn recreate(self) -> Result<Value, RpcError> {
        if self.is_pending() {
            return Err(RpcError::unknown("result is still pending, resolve it first"));
        }
        match self.exception {
            Some(exception) if exception.class == FORBIDDEN_EXCEPTION => {
                Err(RpcError::new(RpcErrorKind::Forbidden, exception.message))
            }
            Some(exception) => Err(RpcError::with_source(
                RpcErrorKind::Biz,
                exception.to_string(),
                exception,
            )),
            None => Ok(self.value),
        }
    }

    pub(crate) fn from_parts(
        value: Value,
        exception: Option<RemoteException>,
        attachments: BTreeMap<String, String>,
    ) -> Self {
        Self {
            value,
            exception,
            attachments,
            pending: Mutex::new(None),
        }
    }
}

impl fmt::Debug for RpcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcResult")
            .field("value", &self.value)
            .field("exception", &self.exception)
            .field("attachments", &self.attachments)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_exception_maps_to_forbidden() {
        let result = RpcResult::from_exception(RemoteException::new(FORBIDDEN_EXCEPTION, "bad token"));
        let err = result.recreate().unwrap_err();
        assert_eq!(err.kind(), RpcErrorKind::Forbidden);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_resolve_pending() {
        let pending = RpcResult::pending(Box::pin(async { Ok(RpcResult::new(Value::from(7))) }));
        assert!(pending.is_pending());
        let resolved = pending.resolve().await.unwrap();
        assert_eq!(resolved.recreate().unwrap(), Value::Int(7));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_result_is_shareable_across_tasks() {
        assert_send_sync::<RpcResult>();
        assert_send_sync::<crate::remoting::Message>();
    }
}
