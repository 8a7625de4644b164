//! Probe-and-translate core.
//!
//! [`CredentialBuilder`] resolves transport security once at startup,
//! [`Prober`] runs one two-phase probe per call, and [`classify`] maps raw
//! failures onto the closed [`ProbeError`] taxonomy consumed by the
//! [`output`](crate::output) adapters.

mod classify;
mod connector;
mod credentials;
pub mod error;
mod prober;
mod status;

pub use classify::classify;
pub use connector::{ProbeConnector, ProbeStream};
pub use credentials::{CredentialBuilder, CredentialError, Credentials, TlsCredentials};
pub use error::{ConnectError, Failure, ProbeError, ProbeResult, RawProbeError};
pub use prober::Prober;
pub use status::ServingStatus;
