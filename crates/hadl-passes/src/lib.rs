pub mod pass;
pub mod simplification;
pub mod spec;
pub mod verification;

// Re-export commonly used types
pub use pass::{Pass, PassError, PassKey, PassManager, PassOrder, PassOutput, PassResults};
pub use simplification::{AlgebraicSimplificationPass, CanonicalizationPass};
pub use spec::{FunctionDef, Instruction, Parameter, Specification};
pub use verification::VerificationPass;
