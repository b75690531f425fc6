use thiserror::Error;

/// Every error kind the core and its backends can raise. Mirrors the
/// original system's error table one-to-one: a CLI front end maps each
/// variant to a process exit code via [`QueueError::exit_code`].
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("malformed job: {0}")]
    MalformedJob(String),

    #[error("job {0:?} already exists")]
    Duplicate(String),

    #[error("no such job {0:?}")]
    NotFound(String),

    #[error("job {id:?} is not dead (state is {state})")]
    WrongState { id: String, state: String },

    #[error("store error: {0}")]
    Store(String),
}

impl QueueError {
    /// Process exit code a CLI should return for this error: 2 for a user
    /// mistake (bad input, wrong DLQ state), 1 for everything backend-side.
    pub fn exit_code(&self) -> i32 {
        match self {
            QueueError::MalformedJob(_) | QueueError::WrongState { .. } => 2,
            QueueError::Duplicate(_) | QueueError::NotFound(_) | QueueError::Store(_) => 1,
        }
    }
}
