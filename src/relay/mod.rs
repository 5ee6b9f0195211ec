//! Message routing to the health data hub.
//!
//! A [`RoutingRequest`](request::RoutingRequest) is either a single message
//! (`processMessage`) or a batch of pre-built transactions (`proxy`). The
//! [`Dispatcher`](dispatcher::Dispatcher) decides per request whether the
//! target domain is reachable from here ([`classifier`]) and either posts
//! to the hub directly ([`executor`]) or hands the request to the gateway
//! that sits inside the hub's network ([`gateway`]).

pub mod classifier;
pub mod dispatcher;
pub mod executor;
pub mod gateway;
pub mod payload;
pub mod request;
pub mod transport;
