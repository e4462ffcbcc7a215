//! Task-level error type.
//!
//! Every fallible operation inside the pipeline (Input, Sector, Output,
//! TaskRunner) reports through this type rather than a bare `io::Error`, so
//! the failure always carries the `TaskStatus` the CLI/caller needs to pick
//! an exit code.

use std::fmt;

use crate::task::TaskStatus;

#[derive(Debug)]
pub struct TaskError {
    pub status: TaskStatus,
    pub message: String,
}

impl TaskError {
    pub fn new(status: TaskStatus, message: impl Into<String>) -> Self {
        TaskError {
            status,
            message: message.into(),
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(TaskStatus::BadInput, message)
    }

    pub fn bad_output(message: impl Into<String>) -> Self {
        Self::new(TaskStatus::BadOutput, message)
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(TaskStatus::InvalidData, message)
    }

    pub fn cannot_write(message: impl Into<String>) -> Self {
        Self::new(TaskStatus::CannotWrite, message)
    }

    pub fn invalid_option(message: impl Into<String>) -> Self {
        Self::new(TaskStatus::InvalidOption, message)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.status, self.message)
    }
}

impl std::error::Error for TaskError {}

pub type TaskResult<T> = Result<T, TaskError>;

pub fn bad_input(message: impl Into<String>) -> TaskError {
    TaskError::bad_input(message)
}

pub fn bad_output(message: impl Into<String>) -> TaskError {
    TaskError::bad_output(message)
}

pub fn invalid_data(message: impl Into<String>) -> TaskError {
    TaskError::invalid_data(message)
}

pub fn cannot_write(message: impl Into<String>) -> TaskError {
    TaskError::cannot_write(message)
}

pub fn invalid_option(message: impl Into<String>) -> TaskError {
    TaskError::invalid_option(message)
}
