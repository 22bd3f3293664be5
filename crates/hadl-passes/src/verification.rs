//! Consistency checking over every behavior in a specification.
//!
//! The pass collects violations from all graphs before reporting, so one
//! broken behavior does not hide problems in another.

use tracing::debug;

use hadl_ir::verify;

use crate::pass::{Pass, PassError, PassOutput, PassResults};
use crate::spec::Specification;

/// Verifies every behavior graph and fails with a combined report when
/// any violation is found.
pub struct VerificationPass;

impl Pass for VerificationPass {
    fn name(&self) -> &'static str {
        "verification"
    }

    fn execute(
        &self,
        _results: &PassResults,
        spec: &mut Specification,
    ) -> Result<PassOutput, PassError> {
        let mut report = Vec::new();
        for behavior in spec.behaviors() {
            if let Err(violations) = verify(behavior) {
                debug!(graph = %behavior.name, count = violations.len(), "violations found");
                for v in violations {
                    report.push(format!("{}: {}", behavior.name, v));
                }
            }
        }
        if report.is_empty() {
            Ok(Box::new(()))
        } else {
            Err(PassError::Execution {
                pass: self.name().into(),
                message: report.join("\n"),
            })
        }
    }
}
