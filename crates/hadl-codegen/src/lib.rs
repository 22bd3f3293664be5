pub mod cpp;

// Re-export commonly used types
pub use cpp::{cpp_type, CodeWriter, CodegenError, CppFunctionGenerator};
