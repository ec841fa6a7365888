pub mod aggregator;
pub mod analytics_store;
pub mod models;

mod sqlite_analytics_store;

pub use aggregator::{
    engagement_score, fold_running_average, recompute_ratio, AnalyticsAggregator,
};
pub use analytics_store::AnalyticsStore;
pub use models::{
    CueEngagement, CueInteraction, NavigationSource, PageType, PageVisitEvent, ReadingSession,
    SessionEndMetrics, UserAnalytics,
};
pub use sqlite_analytics_store::SqliteAnalyticsStore;
