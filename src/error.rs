use crate::coefficients::Coefficient;

/// Failures the price pipeline reports to its callers.
///
/// Cycle failures (everything but [`PriceError::InvalidValue`]) never reach the snapshot
/// consumers: the coordinator logs them and keeps the previous snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("upstream state matches no supported format: {0}")]
    UnsupportedFormat(String),

    #[error("upstream state is recognized but carries no price data")]
    MissingData,

    #[error("upstream entity `{entity_id}` is unavailable")]
    UpstreamUnavailable { entity_id: String },

    #[error("`{value}` is not a valid `{coefficient}`: {reason}")]
    InvalidValue { coefficient: Coefficient, value: f64, reason: String },
}
