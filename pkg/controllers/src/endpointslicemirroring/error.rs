use pkg_state::slices::StoreError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceAction {
    Create,
    Update,
    Delete,
}

impl SliceAction {
    /// Label value used for the changes counter.
    pub fn as_str(&self) -> &'static str {
        match self {
            SliceAction::Create => "create",
            SliceAction::Update => "update",
            SliceAction::Delete => "delete",
        }
    }
}

impl fmt::Display for SliceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceAction::Create => write!(f, "creating"),
            SliceAction::Update => write!(f, "updating"),
            SliceAction::Delete => write!(f, "deleting"),
        }
    }
}

/// One failed store call during finalize.
#[derive(Error, Debug)]
#[error("error {action} EndpointSlice {slice} for Endpoints {endpoints}: {source}")]
pub struct SliceError {
    pub action: SliceAction,
    pub slice: String,
    pub endpoints: String,
    pub source: StoreError,
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Every store call that failed during one finalize, in call order.
    #[error("{}", join(.0))]
    Aggregate(Vec<SliceError>),

    #[error(
        "error(s) deleting {failed}/{total} EndpointSlices for {namespace}/{name} Endpoints, including: {first}"
    )]
    DeleteEndpoints {
        failed: usize,
        total: usize,
        namespace: String,
        name: String,
        first: StoreError,
    },
}

impl ReconcileError {
    /// Individual failures folded into this error.
    pub fn failures(&self) -> &[SliceError] {
        match self {
            ReconcileError::Aggregate(errs) => errs,
            ReconcileError::DeleteEndpoints { .. } => &[],
        }
    }
}

fn join(errs: &[SliceError]) -> String {
    match errs {
        [single] => single.to_string(),
        _ => format!(
            "[{}]",
            errs.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
