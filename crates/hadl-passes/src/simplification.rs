//! Standard rewriting passes: constant folding and the algebraic rule
//! set, each run to fixpoint over every behavior.

use tracing::debug;

use hadl_ir::simplify::{canonicalize_to_fixpoint, default_rules, simplify_to_fixpoint};
use hadl_ir::SimplificationRule;

use crate::pass::{Pass, PassError, PassOutput, PassResults};
use crate::spec::Specification;

/// Folds expressions over constant operands in every behavior.
/// Result: total rewrite count (`usize`).
pub struct CanonicalizationPass;

impl Pass for CanonicalizationPass {
    fn name(&self) -> &'static str {
        "canonicalization"
    }

    fn execute(
        &self,
        _results: &PassResults,
        spec: &mut Specification,
    ) -> Result<PassOutput, PassError> {
        let mut total = 0usize;
        for behavior in spec.behaviors_mut() {
            let folded = canonicalize_to_fixpoint(behavior);
            if folded > 0 {
                debug!(graph = %behavior.name, folded, "constant folding");
            }
            total += folded;
        }
        Ok(Box::new(total))
    }
}

/// Runs an algebraic rule set to fixpoint over every behavior.
/// Result: total rewrite count (`usize`).
pub struct AlgebraicSimplificationPass {
    rules: Vec<Box<dyn SimplificationRule>>,
}

impl AlgebraicSimplificationPass {
    pub fn new(rules: Vec<Box<dyn SimplificationRule>>) -> Self {
        AlgebraicSimplificationPass { rules }
    }
}

impl Default for AlgebraicSimplificationPass {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Pass for AlgebraicSimplificationPass {
    fn name(&self) -> &'static str {
        "algebraic-simplification"
    }

    fn execute(
        &self,
        _results: &PassResults,
        spec: &mut Specification,
    ) -> Result<PassOutput, PassError> {
        let mut total = 0usize;
        for behavior in spec.behaviors_mut() {
            let rewritten = simplify_to_fixpoint(behavior, &self.rules);
            if rewritten > 0 {
                debug!(graph = %behavior.name, rewritten, "algebraic simplification");
            }
            total += rewritten;
        }
        Ok(Box::new(total))
    }
}
