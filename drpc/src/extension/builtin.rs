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

//! Registration of the classes shipped with the crate.
//!
//! Declaration files only bind names to class names; this module binds the
//! class names to constructors.

use crate::cluster::loadbalance::{
    ConsistentHashLoadBalance, LeastActiveLoadBalance, RandomLoadBalance, RoundRobinLoadBalance,
};
use crate::cluster::support::{
    BroadcastCluster, FailbackCluster, FailfastCluster, FailoverCluster, FailsafeCluster,
    ForkingCluster,
};
use crate::cluster::{Cluster, ConditionRouterFactory, LoadBalance, RouterFactory};
use crate::common::constants;
use crate::extension::{Activate, ExtensionClass, ExtensionRegistry};
use crate::protocol::{DubboProtocol, InjvmProtocol};
use crate::registry::{MemoryRegistryFactory, RegistryFactory, RegistryProtocol};
use crate::remoting::{
    AllDispatcher, CachedThreadPool, ConnectionOrderedDispatcher, DirectDispatcher, Dispatcher,
    ExecutionDispatcher, FixedThreadPool, LimitedThreadPool, MessageOnlyDispatcher, ThreadPool,
};
use crate::rpc::filter::{ActiveLimitFilter, EchoFilter, ExceptionFilter, TimeoutFilter, TokenFilter};
use crate::rpc::{DefaultProxyFactory, Filter, Protocol, ProtocolFilterWrapper, ProtocolLoggingWrapper, ProxyFactory};
use crate::serialization::{JsonSerialization, Serialization};
use std::sync::Arc;

macro_rules! unit {
    ($registry:expr, $point:ty, $class:literal, $ty:ty) => {
        $registry.register_class(ExtensionClass::<$point>::named($class, |_| {
            Ok(Arc::new(<$ty>::default()) as Arc<$point>)
        }))
    };
}

pub(crate) fn install(registry: &Arc<ExtensionRegistry>) {
    install_cluster(registry);
    install_remoting(registry);
    install_rpc(registry);

    unit!(registry, dyn Serialization, "drpc::serialization::JsonSerialization", JsonSerialization);
    #[cfg(feature = "postcard")]
    unit!(
        registry,
        dyn Serialization,
        "drpc::serialization::PostcardSerialization",
        crate::serialization::PostcardSerialization
    );

    unit!(registry, dyn RegistryFactory, "drpc::registry::MemoryRegistryFactory", MemoryRegistryFactory);
}

fn install_cluster(registry: &ExtensionRegistry) {
    unit!(registry, dyn LoadBalance, "drpc::cluster::loadbalance::RandomLoadBalance", RandomLoadBalance);
    unit!(registry, dyn LoadBalance, "drpc::cluster::loadbalance::RoundRobinLoadBalance", RoundRobinLoadBalance);
    unit!(registry, dyn LoadBalance, "drpc::cluster::loadbalance::LeastActiveLoadBalance", LeastActiveLoadBalance);
    unit!(
        registry,
        dyn LoadBalance,
        "drpc::cluster::loadbalance::ConsistentHashLoadBalance",
        ConsistentHashLoadBalance
    );

    macro_rules! cluster {
        ($class:literal, $ty:ident) => {
            registry.register_class(ExtensionClass::<dyn Cluster>::named($class, |inj| {
                Ok(Arc::new($ty::new(inj.loader::<dyn LoadBalance>())) as Arc<dyn Cluster>)
            }))
        };
    }
    cluster!("drpc::cluster::support::FailoverCluster", FailoverCluster);
    cluster!("drpc::cluster::support::FailfastCluster", FailfastCluster);
    cluster!("drpc::cluster::support::FailsafeCluster", FailsafeCluster);
    cluster!("drpc::cluster::support::FailbackCluster", FailbackCluster);
    cluster!("drpc::cluster::support::ForkingCluster", ForkingCluster);
    cluster!("drpc::cluster::support::BroadcastCluster", BroadcastCluster);

    unit!(registry, dyn RouterFactory, "drpc::cluster::ConditionRouterFactory", ConditionRouterFactory);
}

fn install_remoting(registry: &ExtensionRegistry) {
    unit!(registry, dyn ThreadPool, "drpc::remoting::threadpool::FixedThreadPool", FixedThreadPool);
    unit!(registry, dyn ThreadPool, "drpc::remoting::threadpool::CachedThreadPool", CachedThreadPool);
    unit!(registry, dyn ThreadPool, "drpc::remoting::threadpool::LimitedThreadPool", LimitedThreadPool);

    macro_rules! pooled {
        ($class:literal, $ty:ident) => {
            registry.register_class(ExtensionClass::<dyn Dispatcher>::named($class, |inj| {
                Ok(Arc::new($ty::new(inj.inject::<dyn ThreadPool>("threadpool")?)) as Arc<dyn Dispatcher>)
            }))
        };
    }
    pooled!("drpc::remoting::dispatcher::AllDispatcher", AllDispatcher);
    pooled!("drpc::remoting::dispatcher::MessageOnlyDispatcher", MessageOnlyDispatcher);
    pooled!("drpc::remoting::dispatcher::ExecutionDispatcher", ExecutionDispatcher);
    unit!(registry, dyn Dispatcher, "drpc::remoting::dispatcher::DirectDispatcher", DirectDispatcher);
    unit!(
        registry,
        dyn Dispatcher,
        "drpc::remoting::dispatcher::ConnectionOrderedDispatcher",
        ConnectionOrderedDispatcher
    );
}

fn install_rpc(registry: &ExtensionRegistry) {
    unit!(registry, dyn ProxyFactory, "drpc::rpc::proxy::DefaultProxyFactory", DefaultProxyFactory);

    registry.register_class(ExtensionClass::<dyn Protocol>::named(
        "drpc::protocol::dubbo::DubboProtocol",
        |inj| {
            Ok(DubboProtocol::new(
                inj.inject::<dyn Dispatcher>("dispatcher")?,
                inj.loader::<dyn Serialization>(),
            ) as Arc<dyn Protocol>)
        },
    ));
    unit!(registry, dyn Protocol, "drpc::protocol::injvm::InjvmProtocol", InjvmProtocol);
    registry.register_class(ExtensionClass::<dyn Protocol>::named(
        "drpc::registry::RegistryProtocol",
        |inj| {
            Ok(Arc::new(RegistryProtocol::new(
                inj.inject::<dyn Protocol>("protocol")?,
                inj.inject::<dyn RegistryFactory>("registryfactory")?,
                inj.inject::<dyn Cluster>("cluster")?,
                inj.inject::<dyn RouterFactory>("routerfactory")?,
            )) as Arc<dyn Protocol>)
        },
    ));
    registry.register_class(ExtensionClass::<dyn Protocol>::wrapper(
        "drpc::rpc::protocol::ProtocolFilterWrapper",
        |inner, inj| Ok(Arc::new(ProtocolFilterWrapper::new(inner, inj.loader::<dyn Filter>())) as Arc<dyn Protocol>),
    ));
    registry.register_class(ExtensionClass::<dyn Protocol>::wrapper(
        "drpc::rpc::protocol::ProtocolLoggingWrapper",
        |inner, _| Ok(Arc::new(ProtocolLoggingWrapper::new(inner)) as Arc<dyn Protocol>),
    ));

    registry.register_class(
        ExtensionClass::<dyn Filter>::named("drpc::rpc::filter::EchoFilter", |_| {
            Ok(Arc::new(EchoFilter) as Arc<dyn Filter>)
        })
        .with_activate(Activate::new().group(&[constants::PROVIDER]).order(-110_000)),
    );
    registry.register_class(
        ExtensionClass::<dyn Filter>::named("drpc::rpc::filter::TokenFilter", |_| {
            Ok(Arc::new(TokenFilter) as Arc<dyn Filter>)
        })
        .with_activate(
            Activate::new()
                .group(&[constants::PROVIDER])
                .value(&[constants::TOKEN_KEY]),
        ),
    );
    registry.register_class(
        ExtensionClass::<dyn Filter>::named("drpc::rpc::filter::ActiveLimitFilter", |_| {
            Ok(Arc::new(ActiveLimitFilter) as Arc<dyn Filter>)
        })
        .with_activate(
            Activate::new()
                .group(&[constants::CONSUMER])
                .value(&[constants::ACTIVES_KEY]),
        ),
    );
    registry.register_class(
        ExtensionClass::<dyn Filter>::named("drpc::rpc::filter::TimeoutFilter", |_| {
            Ok(Arc::new(TimeoutFilter) as Arc<dyn Filter>)
        })
        .with_activate(
            Activate::new()
                .group(&[constants::PROVIDER])
                .value(&[constants::TIMEOUT_KEY]),
        ),
    );
    registry.register_class(
        ExtensionClass::<dyn Filter>::named("drpc::rpc::filter::ExceptionFilter", |_| {
            Ok(Arc::new(ExceptionFilter) as Arc<dyn Filter>)
        })
        .with_activate(Activate::new().group(&[constants::PROVIDER])),
    );
}
