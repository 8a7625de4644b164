//! Integration tests for grpc_health_proxy
//!
//! Every test starts its own example health server and, where needed, a
//! proxy server on ephemeral loopback ports, so the suite needs no external
//! services.
//!
//! Run with: cargo test --test integration

mod helpers;

mod http_endpoint;
mod probe;
mod tls;
