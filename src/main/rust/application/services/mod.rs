mod media_validator;
mod reorder_buffer;
mod session_manager;
mod statistics_aggregator;
mod stream_connection;
mod subscriptions;

pub use media_validator::MediaSourceValidator;
pub use reorder_buffer::ReorderBuffer;
pub use session_manager::DetectionSessionManager;
pub use statistics_aggregator::StatisticsAggregator;
pub use stream_connection::{ConnectionItem, StreamConnection};
pub use subscriptions::{SessionUpdate, Subscription, SubscriptionHandle, UpdateKind};
