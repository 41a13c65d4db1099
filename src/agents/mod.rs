// Agents module
// Retrieval-answer pipeline and document pipeline built on the shared memory

pub mod knowledge;
pub mod prompts;
pub mod reading;

pub use knowledge::{KnowledgeButler, NO_RESULTS_MESSAGE, build_context};
pub use reading::{IngestReport, ReadingCompanion, SummaryConfig};
