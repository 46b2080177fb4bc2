pub mod batch_runner;
pub mod options;
pub mod output;
pub mod processor;

pub use batch_runner::BatchRunner;
pub use options::{CloudOptions, InversionOptions, PblOptions};
pub use output::{Attributes, RetrievalOutput, RetrievalStats, Variable};
pub use processor::ProfileOrchestrator;
