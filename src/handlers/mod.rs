mod health_check;
mod load_balancer;
mod reverse_proxy;
mod static_asset;

pub use health_check::HealthCheckHandler;
pub use load_balancer::LoadBalancerHandler;
pub use reverse_proxy::ReverseProxyHandler;
pub use static_asset::StaticAssetHandler;

use crate::config::{TaskConfig, Upstream};
use crate::error::FrontResult;
use crate::http::{Request, Response};

/// One of the four dispatchable task kinds. Each variant owns everything it
/// needs to answer a request on its own; the match engine only ever hands it
/// a `&Request` and takes back a `Response`.
pub enum Handler {
    StaticAsset(StaticAssetHandler),
    HealthCheck(HealthCheckHandler),
    ReverseProxy(ReverseProxyHandler),
    LoadBalancer(LoadBalancerHandler),
}

impl Handler {
    /// Build a live handler from its configuration. Static asset roots are
    /// walked once, here, so request handling never touches the filesystem
    /// for directory listings.
    pub fn build(task: &TaskConfig) -> FrontResult<Self> {
        Ok(match task {
            TaskConfig::StaticAsset { root, strip_prefix } => {
                Handler::StaticAsset(StaticAssetHandler::new(root, strip_prefix)?)
            }
            TaskConfig::HealthCheck => Handler::HealthCheck(HealthCheckHandler),
            TaskConfig::ReverseProxy { upstream } => {
                Handler::ReverseProxy(ReverseProxyHandler::new(upstream.clone()))
            }
            TaskConfig::LoadBalancer {
                strategy,
                upstreams,
            } => Handler::LoadBalancer(LoadBalancerHandler::new(*strategy, upstreams.clone())?),
        })
    }

    /// Answer a request by blocking for as long as it takes. Used by the
    /// thread-per-client and thread-per-request strategies, where a blocked
    /// OS thread costs nothing but itself.
    pub fn handle_blocking(&self, request: &Request) -> Response {
        match self {
            Handler::StaticAsset(h) => h.handle(request),
            Handler::HealthCheck(h) => h.handle(request),
            Handler::ReverseProxy(h) => h.handle_blocking(request),
            Handler::LoadBalancer(h) => h.handle_blocking(request),
        }
    }

    /// For the two handler kinds whose work is itself an outbound socket
    /// (`ReverseProxy`/`LoadBalancer`), resolves which upstream to connect to
    /// without touching the network. The cooperative scheduler uses this to
    /// drive its own non-blocking connect/write/read state machine instead of
    /// calling [`Handler::handle_blocking`] and stalling its one thread on
    /// upstream I/O. `StaticAsset`/`HealthCheck` answer from memory with no
    /// I/O of their own, so they have nothing to resolve here and the
    /// cooperative scheduler keeps calling `handle_blocking` for them.
    pub fn async_upstream(&self) -> Option<FrontResult<Upstream>> {
        match self {
            Handler::ReverseProxy(h) => Some(Ok(h.upstream())),
            Handler::LoadBalancer(h) => Some(h.pick_upstream()),
            Handler::StaticAsset(_) | Handler::HealthCheck(_) => None,
        }
    }
}
