pub mod result;
pub mod utils;
pub mod verdict;

pub use result::TestResult;
pub use verdict::TestState;
