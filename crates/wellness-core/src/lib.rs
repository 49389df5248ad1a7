pub mod storage;
pub mod llm;
pub mod context;
pub mod search;
pub mod enrichment;
pub mod notify;
pub mod worker;

pub use context::ContextAggregator;
pub use enrichment::{EnrichmentPipeline, ProcessOutcome};
pub use llm::{LLMClient, UpstreamError};
pub use notify::{DeliveryReport, DispatchSummary, NotificationDispatcher};
pub use search::{JournalSearch, SearchHit};
pub use storage::{DocumentStore, LocalFileSystemStore, ObjectStore};
pub use worker::ReminderWorker;
