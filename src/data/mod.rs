pub mod loader;
pub mod pubsub;
pub mod controller;

pub use loader::{CurrencyRecord, TraderRecord, CatalogLoader};
pub use pubsub::{TopicBus, TopicMessage, TopicFilter, MessageSink, ServerFrame, SubscriptionMessage};
pub use controller::{BroadcastLoop, BroadcastSettings, BroadcastStats, StatsSnapshot, CycleReport, PairSnapshot};
