use std::sync::Arc;
use std::time::Duration;

use crate::request::{GatewayRequest, GatewayResponse};

/// A stage in the gateway's request pipeline.
///
/// `before` may modify the request on its way upstream, or end the request
/// by returning a response. `after` observes the response on the way back.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &mut GatewayRequest) -> Option<GatewayResponse> {
        None
    }
    fn after(&self, _req: &GatewayRequest, _res: &mut GatewayResponse, _latency: Duration) {}
}

/// Run `before` hooks in order, stopping at the first response
pub fn run_before(
    chain: &[Arc<dyn Middleware>],
    req: &mut GatewayRequest,
) -> Option<GatewayResponse> {
    chain.iter().find_map(|mw| mw.before(req))
}
