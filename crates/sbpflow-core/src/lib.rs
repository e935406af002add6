pub mod kernel;
pub mod operand;
pub mod parallel;
pub mod tensor;

pub use kernel::*;
pub use operand::*;
pub use parallel::*;
pub use tensor::*;
