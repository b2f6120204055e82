use pod_net::PodNetError;
use thiserror::Error;

/// Errors raised by the dashboard layer
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error(transparent)]
    Net(#[from] PodNetError),

    #[error("Unknown pod {0}")]
    UnknownPod(String),
}

pub type DashboardResult<T> = Result<T, DashboardError>;
