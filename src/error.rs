//! Error type shared by every proposal, the covariance helpers and the sampler driver.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProposalError {
    #[error("sigma list must have an entry for each parameter: expected {expected}, got {found}")]
    SigmaLength { expected: usize, found: usize },

    #[error("sigma[{index}] = {value} is not a finite positive number")]
    InvalidSigma { index: usize, value: f64 },

    #[error("mismatched number of parameters: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("covariance matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("covariance matrix is not symmetric at ({row}, {col})")]
    NotSymmetric { row: usize, col: usize },

    #[error("covariance matrix contains a non-finite entry at ({row}, {col})")]
    NonFiniteCovariance { row: usize, col: usize },

    #[error("matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("acceptance efficiency {0} is outside [0, 1]")]
    InvalidEfficiency(f64),

    #[error("adaptation settings give a non-positive scale {scale} at efficiency {efficiency}")]
    InvalidAdaptSettings { efficiency: f64, scale: f64 },

    #[error("no candidate satisfied every domain predicate after {attempts} attempts")]
    DomainExhausted { attempts: usize },

    #[error("block recorded to start at index {found} but is placed at offset {expected}")]
    BlockMisaligned { expected: usize, found: usize },

    #[error("covariance re-estimation needs at least two samples, got {0}")]
    InsufficientSamples(usize),

    #[error("step size {index} = {value} must be finite and positive")]
    InvalidStepSize { index: usize, value: f64 },

    #[error("objective returned a non-finite value while estimating the Hessian")]
    NonFiniteObjective,

    #[error("covariance update rejected, keeping previous covariance: {0}")]
    UpdateRejected(Box<ProposalError>),
}

impl ProposalError {
    /// True when the proposal is still in a usable state and sampling may continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProposalError::UpdateRejected(_))
    }
}

pub type Result<T> = std::result::Result<T, ProposalError>;
