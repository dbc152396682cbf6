// src/exec/result.rs

use serde::{Deserialize, Serialize};

use crate::errors::ExecutionError;

/// Outcome of one command invocation. Created per request, serialized, dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Success,
    Failure(ExecutionError),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success)
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            ExecutionResult::Success => None,
            ExecutionResult::Failure(e) => Some(e),
        }
    }

    /// 200 on success, 500 on any failure.
    pub fn http_status(&self) -> u16 {
        if self.is_success() { 200 } else { 500 }
    }

    pub fn body(&self) -> ResponseBody {
        ResponseBody::from(self)
    }
}

impl From<Result<(), ExecutionError>> for ExecutionResult {
    fn from(res: Result<(), ExecutionError>) -> Self {
        match res {
            Ok(()) => ExecutionResult::Success,
            Err(e) => ExecutionResult::Failure(e),
        }
    }
}

/// JSON body written for every handled request.
///
/// Both fields are omitted when absent, so the only shapes on the wire are
/// `{"status":"success"}` and `{"error":"<message>"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ExecutionResult> for ResponseBody {
    fn from(result: &ExecutionResult) -> Self {
        match result {
            ExecutionResult::Success => ResponseBody {
                status: Some("success".to_string()),
                error: None,
            },
            ExecutionResult::Failure(e) => ResponseBody {
                status: None,
                error: Some(e.to_string()),
            },
        }
    }
}
