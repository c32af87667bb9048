pub mod catalog;
pub mod config;
pub mod context;
pub mod envelope;
pub mod headers;
pub mod observe;
pub mod sink;
pub mod span;

pub use catalog::{OperationCatalog, OperationDescriptor};
pub use config::InstrumentationConfig;
pub use context::TelemetryContext;
pub use envelope::{Envelope, FaultInfo};
pub use headers::{CorrelationHeaders, HeaderBag};
pub use sink::{MemorySink, NullSink, TelemetrySink, TracingSink};
pub use span::{Span, SpanKind};
