use crate::data::AcceptancePolicy;
use crate::error::ValidationError;

/// Outcome of checking a response head against an [`AcceptancePolicy`].
///
/// Both checks always run; whether a failure aborts the operation depends on
/// the policy's abort flags and is decided by [`ValidationReport::verdict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub status: u16,
    pub content_type: Option<String>,
    pub status_code_acceptable: bool,
    pub content_type_acceptable: bool,
}

impl ValidationReport {
    pub fn is_acceptable(&self) -> bool {
        self.status_code_acceptable && self.content_type_acceptable
    }

    /// The error to abort with, if any. Status code is checked first.
    pub fn verdict(&self, policy: &AcceptancePolicy) -> Result<(), ValidationError> {
        if policy.abort_on_status_code_error && !self.status_code_acceptable {
            return Err(ValidationError::StatusCode {
                status: self.status,
            });
        }
        if policy.abort_on_content_type_error && !self.content_type_acceptable {
            return Err(ValidationError::ContentType {
                content_type: self.content_type.clone(),
            });
        }
        Ok(())
    }
}

/// Check `status` and `content_type` against `policy`.
///
/// # Examples
///
/// ```
/// use pulith_operation::{validate, AcceptancePolicy};
///
/// let policy = AcceptancePolicy::default().abort_on_status_code_error(true);
/// let report = validate(&policy, 404, Some("text/html"));
///
/// assert!(!report.status_code_acceptable);
/// assert!(report.content_type_acceptable);
/// assert!(report.verdict(&policy).is_err());
/// ```
pub fn validate(
    policy: &AcceptancePolicy,
    status: u16,
    content_type: Option<&str>,
) -> ValidationReport {
    ValidationReport {
        status,
        content_type: content_type.map(str::to_string),
        status_code_acceptable: policy.accepts_status(status),
        content_type_acceptable: policy.accepts_content_type(content_type),
    }
}
