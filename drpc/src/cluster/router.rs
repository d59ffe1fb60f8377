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

//! Routers: per-invocation filters over a directory's candidates.

use crate::common::{constants, HasUrl, Url};
use crate::rpc::{Invocation, Invoker};
use crate::spi;
use crate::{RpcError, RpcErrorKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, warn};

/// Narrows a candidate list for one invocation.
pub trait Router: HasUrl + Send + Sync + 'static {
    /// Routers run in descending priority.
    fn priority(&self) -> i32 {
        0
    }

    /// The subset of `invokers` that may serve `invocation` for the consumer
    /// at `url`.
    ///
    /// # Errors
    ///
    /// A router that cannot evaluate its rule.
    fn route(
        &self,
        invokers: &[Arc<dyn Invoker>],
        url: &Url,
        invocation: &Invocation,
    ) -> Result<Vec<Arc<dyn Invoker>>, RpcError>;
}

/// Runs `routers` in order over `invokers`. A failing router is logged and
/// skipped.
pub fn route(
    routers: &[Arc<dyn Router>],
    mut invokers: Vec<Arc<dyn Invoker>>,
    url: &Url,
    invocation: &Invocation,
) -> Vec<Arc<dyn Invoker>> {
    for router in routers {
        match router.route(&invokers, url, invocation) {
            Ok(routed) => invokers = routed,
            Err(err) => {
                error!(router = %router.url(), error = %err, "failed to execute router");
            }
        }
    }
    invokers
}

/// Builds routers from `route://`-style rule URLs; the adaptive factory
/// dispatches on the URL scheme.
#[spi(name = "drpc.cluster.RouterFactory")]
pub trait RouterFactory: Send + Sync {
    /// Builds the router described by `url`.
    ///
    /// # Errors
    ///
    /// Malformed rules.
    #[adaptive("protocol")]
    fn get_router(&self, url: &Url) -> Result<Arc<dyn Router>, RpcError>;
}

/// Builds [`ConditionRouter`]s.
#[derive(Debug, Default)]
pub struct ConditionRouterFactory;

impl RouterFactory for ConditionRouterFactory {
    fn get_router(&self, url: &Url) -> Result<Arc<dyn Router>, RpcError> {
        Ok(Arc::new(ConditionRouter::new(url.clone())?))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct MatchPair {
    matches: BTreeSet<String>,
    mismatches: BTreeSet<String>,
}

impl MatchPair {
    fn is_match(&self, value: &str) -> bool {
        let hit = |set: &BTreeSet<String>| set.iter().any(|pattern| glob_match(pattern, value));
        match (self.matches.is_empty(), self.mismatches.is_empty()) {
            (false, true) => hit(&self.matches),
            (true, false) => !hit(&self.mismatches),
            (false, false) => !hit(&self.mismatches) && hit(&self.matches),
            (true, true) => false,
        }
    }
}

type Conditions = BTreeMap<String, MatchPair>;

fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == constants::ANY_VALUE {
        return true;
    }
    match pattern.find('*') {
        None => pattern == value,
        Some(star) if star == pattern.len() - 1 => value.starts_with(&pattern[..star]),
        Some(0) => value.ends_with(&pattern[1..]),
        Some(star) => {
            let (prefix, suffix) = (&pattern[..star], &pattern[star + 1..]);
            value.len() >= prefix.len() + suffix.len()
                && value.starts_with(prefix)
                && value.ends_with(suffix)
        }
    }
}

fn is_separator(byte: u8) -> bool {
    matches!(byte, b'&' | b'!' | b'=' | b',')
}

/// Splits a rule into `(separator, content)` tokens: `host = a,b & method != x`
/// yields `("", host) ("=", a) (",", b) ("&", method) ("!=", x)`.
fn tokenize(rule: &str) -> Vec<(&str, &str)> {
    let bytes = rule.as_bytes();
    let mut tokens = Vec::new();
    let mut at = 0;
    while at < bytes.len() {
        while at < bytes.len() && bytes[at].is_ascii_whitespace() {
            at += 1;
        }
        let separator_start = at;
        while at < bytes.len() && is_separator(bytes[at]) {
            at += 1;
        }
        let separator = &rule[separator_start..at];
        while at < bytes.len() && bytes[at].is_ascii_whitespace() {
            at += 1;
        }
        let content_start = at;
        while at < bytes.len() && !is_separator(bytes[at]) && !bytes[at].is_ascii_whitespace() {
            at += 1;
        }
        if content_start < at {
            tokens.push((separator, &rule[content_start..at]));
        }
    }
    tokens
}

#[derive(Clone, Copy)]
enum Side {
    Matches,
    Mismatches,
}

fn illegal_rule(rule: &str, separator: &str, content: &str) -> RpcError {
    RpcError::new(
        RpcErrorKind::Unknown,
        format!("Illegal route rule \"{rule}\", the \"{separator}\" before \"{content}\" is invalid"),
    )
}

fn parse_conditions(rule: &str) -> Result<Conditions, RpcError> {
    let mut conditions = Conditions::new();
    let mut key: Option<String> = None;
    let mut side: Option<Side> = None;
    for (separator, content) in tokenize(rule) {
        match separator {
            "" | "&" => {
                conditions.entry(content.to_string()).or_default();
                key = Some(content.to_string());
                side = None;
            }
            "=" | "!=" => {
                let pair = key
                    .as_ref()
                    .and_then(|key| conditions.get_mut(key))
                    .ok_or_else(|| illegal_rule(rule, separator, content))?;
                let chosen = if separator == "=" { Side::Matches } else { Side::Mismatches };
                match chosen {
                    Side::Matches => pair.matches.insert(content.to_string()),
                    Side::Mismatches => pair.mismatches.insert(content.to_string()),
                };
                side = Some(chosen);
            }
            "," => {
                let pair = key
                    .as_ref()
                    .and_then(|key| conditions.get_mut(key))
                    .ok_or_else(|| illegal_rule(rule, separator, content))?;
                match side {
                    Some(Side::Matches) => pair.matches.insert(content.to_string()),
                    Some(Side::Mismatches) => pair.mismatches.insert(content.to_string()),
                    None => return Err(illegal_rule(rule, separator, content)),
                };
            }
            _ => return Err(illegal_rule(rule, separator, content)),
        }
    }
    Ok(conditions)
}

fn sample(key: &str, url: &Url, invocation: Option<&Invocation>) -> Option<String> {
    match key {
        "method" | "methods" if invocation.is_some() => invocation.map(|inv| inv.method_name().to_string()),
        "address" => Some(url.address()),
        "host" => Some(url.host().to_string()),
        "port" => Some(url.port().to_string()),
        "protocol" => Some(url.protocol().to_string()),
        "path" => Some(url.path().to_string()),
        _ => url.parameter(key).map(str::to_string),
    }
}

fn match_conditions(conditions: &Conditions, url: &Url, invocation: Option<&Invocation>) -> bool {
    let mut result = false;
    for (key, pair) in conditions {
        match sample(key, url, invocation) {
            Some(value) if !value.is_empty() => {
                if !pair.is_match(&value) {
                    return false;
                }
                result = true;
            }
            _ => {
                if !pair.matches.is_empty() {
                    return false;
                }
                result = true;
            }
        }
    }
    result
}

/// Routes by `when => then` conditions over URL fields.
///
/// The rule is read from the `rule` parameter of the router URL. The `when`
/// part is matched against the consumer URL and the invocation (`method`),
/// the `then` part selects providers:
///
/// ```text
/// method = find* => host = 10.0.0.1,10.0.0.2
/// host != 10.0.0.9 => port = 20880
/// host = 10.0.0.3 =>
/// ```
///
/// An empty `when` applies to every consumer; an empty `then` blacklists the
/// matched consumers. When no provider satisfies `then`, the unfiltered list
/// is returned unless the router URL sets `force=true`.
#[derive(Debug)]
pub struct ConditionRouter {
    url: Url,
    priority: i32,
    force: bool,
    when: Conditions,
    then: Option<Conditions>,
}

impl ConditionRouter {
    /// Parses the router described by `url`.
    ///
    /// # Errors
    ///
    /// A missing or malformed `rule` parameter.
    pub fn new(url: Url) -> Result<Self, RpcError> {
        let rule = url
            .parameter(constants::RULE_KEY)
            .filter(|rule| !rule.trim().is_empty())
            .ok_or_else(|| RpcError::new(RpcErrorKind::Unknown, "Illegal route rule!"))?
            .replace("consumer.", "")
            .replace("provider.", "");
        let (when_rule, then_rule) = match rule.find("=>") {
            Some(at) => (rule[..at].trim(), rule[at + 2..].trim()),
            None => ("", rule.trim()),
        };
        let when = if when_rule.is_empty() || when_rule == "true" {
            Conditions::new()
        } else {
            parse_conditions(when_rule)?
        };
        let then = if then_rule.is_empty() || then_rule == "false" {
            None
        } else {
            Some(parse_conditions(then_rule)?)
        };
        Ok(Self {
            priority: url.get(constants::PRIORITY_KEY, 0),
            force: url.get(constants::FORCE_KEY, false),
            url,
            when,
            then,
        })
    }

    /// A router for `rule` under a synthetic `condition://` URL.
    ///
    /// # Errors
    ///
    /// See [`ConditionRouter::new`].
    pub fn from_rule(rule: &str) -> Result<Self, RpcError> {
        let url = Url::new(constants::CONDITION_PROTOCOL, constants::ANYHOST_VALUE, 0, "")
            .with_parameter(constants::RULE_KEY, rule);
        Self::new(url)
    }

    fn match_when(&self, url: &Url, invocation: &Invocation) -> bool {
        self.when.is_empty() || match_conditions(&self.when, url, Some(invocation))
    }
}

impl HasUrl for ConditionRouter {
    fn url(&self) -> &Url {
        &self.url
    }
}

impl Router for ConditionRouter {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn route(
        &self,
        invokers: &[Arc<dyn Invoker>],
        url: &Url,
        invocation: &Invocation,
    ) -> Result<Vec<Arc<dyn Invoker>>, RpcError> {
        if invokers.is_empty() || !self.match_when(url, invocation) {
            return Ok(invokers.to_vec());
        }
        let Some(then) = &self.then else {
            warn!(consumer = %url.address(), service = %url.service_key(), "consumer is blacklisted by route rule");
            return Ok(Vec::new());
        };
        let routed: Vec<Arc<dyn Invoker>> = invokers
            .iter()
            .filter(|invoker| !then.is_empty() && match_conditions(then, invoker.url(), None))
            .cloned()
            .collect();
        if !routed.is_empty() {
            Ok(routed)
        } else if self.force {
            warn!(router = %self.url, service = %url.service_key(), "route result is empty and force execute");
            Ok(routed)
        } else {
            Ok(invokers.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcResult;
    use async_trait::async_trait;

    struct Stub(Url);

    impl HasUrl for Stub {
        fn url(&self) -> &Url {
            &self.0
        }
    }

    #[async_trait]
    impl Invoker for Stub {
        fn interface(&self) -> &str {
            "acme.Greeter"
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn invoke(&self, _: &Invocation) -> Result<RpcResult, RpcError> {
            Ok(RpcResult::empty())
        }
        fn destroy(&self) {}
    }

    fn providers() -> Vec<Arc<dyn Invoker>> {
        ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
            .iter()
            .map(|host| {
                Arc::new(Stub(Url::parse(&format!("dubbo://{host}:20880/acme.Greeter")).unwrap())) as Arc<dyn Invoker>
            })
            .collect()
    }

    fn consumer() -> Url {
        Url::parse("consumer://10.0.0.9/acme.Greeter").unwrap()
    }

    fn hosts(invokers: &[Arc<dyn Invoker>]) -> Vec<String> {
        invokers.iter().map(|i| i.url().host().to_string()).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("host = a,b & method != x"),
            vec![("", "host"), ("=", "a"), (",", "b"), ("&", "method"), ("!=", "x")]
        );
    }

    #[test]
    fn test_glob() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("find*", "findUser"));
        assert!(glob_match("*User", "findUser"));
        assert!(glob_match("f*r", "findUser"));
        assert!(!glob_match("find*", "getUser"));
    }

    #[test]
    fn test_method_rule_selects_hosts() {
        let router = ConditionRouter::from_rule("method = find* => host = 10.0.0.1,10.0.0.3").unwrap();
        let find = Invocation::new("findUser", Vec::<String>::new(), vec![]);
        let save = Invocation::new("saveUser", Vec::<String>::new(), vec![]);
        assert_eq!(
            hosts(&router.route(&providers(), &consumer(), &find).unwrap()),
            vec!["10.0.0.1", "10.0.0.3"]
        );
        assert_eq!(router.route(&providers(), &consumer(), &save).unwrap().len(), 3);
    }

    #[test]
    fn test_mismatch_and_blacklist() {
        let router = ConditionRouter::from_rule("=> host != 10.0.0.2").unwrap();
        let call = Invocation::new("find", Vec::<String>::new(), vec![]);
        assert_eq!(
            hosts(&router.route(&providers(), &consumer(), &call).unwrap()),
            vec!["10.0.0.1", "10.0.0.3"]
        );

        let blacklist = ConditionRouter::from_rule("host = 10.0.0.9 =>").unwrap();
        assert!(blacklist.route(&providers(), &consumer(), &call).unwrap().is_empty());
    }

    #[test]
    fn test_force() {
        let call = Invocation::new("find", Vec::<String>::new(), vec![]);
        let lenient = ConditionRouter::from_rule("=> host = 10.9.9.9").unwrap();
        assert_eq!(lenient.route(&providers(), &consumer(), &call).unwrap().len(), 3);

        let url = Url::new("condition", "0.0.0.0", 0, "")
            .with_parameter("rule", "=> host = 10.9.9.9")
            .with_parameter("force", true);
        let forced = ConditionRouter::new(url).unwrap();
        assert!(forced.route(&providers(), &consumer(), &call).unwrap().is_empty());
    }

    #[test]
    fn test_illegal_rule() {
        assert!(ConditionRouter::from_rule("= 10.0.0.1 => host = 10.0.0.2").is_err());
        assert!(ConditionRouter::from_rule("").is_err());
    }
}
