// Domain models: feed columns and the aggregate row written once per cycle

mod record;
mod source;

pub use record::{AggregateRecord, PROCESSED_PROPERTY};
pub use source::SourceField;
