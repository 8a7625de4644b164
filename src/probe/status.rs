//! Serving status reported by the gRPC health protocol.

use tonic_health::pb::health_check_response::ServingStatus as PbServingStatus;

/// Outcome of a successful Check round trip.
///
/// Mirrors `grpc.health.v1.HealthCheckResponse.ServingStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
    ServiceUnknown,
}

impl ServingStatus {
    /// All statuses, in wire order.
    pub const ALL: [ServingStatus; 4] = [
        ServingStatus::Unknown,
        ServingStatus::Serving,
        ServingStatus::NotServing,
        ServingStatus::ServiceUnknown,
    ];

    /// Decode the wire value; anything unrecognised is `Unknown`.
    pub fn from_wire(value: i32) -> Self {
        PbServingStatus::try_from(value)
            .map(Self::from)
            .unwrap_or(Self::Unknown)
    }

    /// Protocol name of the status (e.g. `SERVING`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Serving => "SERVING",
            Self::NotServing => "NOT_SERVING",
            Self::ServiceUnknown => "SERVICE_UNKNOWN",
        }
    }

    #[inline]
    pub fn is_serving(&self) -> bool {
        *self == Self::Serving
    }
}

impl std::fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PbServingStatus> for ServingStatus {
    fn from(status: PbServingStatus) -> Self {
        match status {
            PbServingStatus::Unknown => Self::Unknown,
            PbServingStatus::Serving => Self::Serving,
            PbServingStatus::NotServing => Self::NotServing,
            PbServingStatus::ServiceUnknown => Self::ServiceUnknown,
        }
    }
}

impl From<ServingStatus> for PbServingStatus {
    fn from(status: ServingStatus) -> Self {
        match status {
            ServingStatus::Unknown => Self::Unknown,
            ServingStatus::Serving => Self::Serving,
            ServingStatus::NotServing => Self::NotServing,
            ServingStatus::ServiceUnknown => Self::ServiceUnknown,
        }
    }
}
