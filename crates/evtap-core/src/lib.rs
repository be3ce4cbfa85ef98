pub mod error;
pub mod fault;
pub mod id;
pub mod location;
pub mod value;

// Re-export commonly used types
pub use error::{AnalysisError, CoreError};
pub use fault::{ControlTransfer, Fault, ProgramFault};
pub use id::LocationId;
pub use location::{ExecutionLocation, OperationKind, SourceSpan};
pub use value::{FunctionRef, Value};
