//! Per-user analytics aggregation.
//!
//! Each event folds into the user's single aggregate row. Two update rules
//! coexist and must not be unified: the running averages fold incrementally
//! with the pre-increment count, while the cue completion rate is recomputed
//! from scratch on every update.

use super::analytics_store::AnalyticsStore;
use super::models::{
    PageType, PageVisitEvent, ReadingSession, SessionEndMetrics, UserAnalytics,
};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, warn};
use uuid::Uuid;

/// `(old_avg * old_count + sample) / (old_count + 1)`, evaluated before the
/// count increments. Keeps aggregates drift-free under interleaved updates.
pub fn fold_running_average(old_avg: f64, old_count: u64, sample: f64) -> f64 {
    (old_avg * old_count as f64 + sample) / (old_count + 1) as f64
}

/// `completed / encountered * 100`, recomputed from scratch each update.
pub fn recompute_ratio(completed: u64, encountered: u64) -> f64 {
    if encountered == 0 {
        return 0.0;
    }
    completed as f64 / encountered as f64 * 100.0
}

/// Bounded heuristic: base 50, +30 when the child waited at least 10s before
/// clicking a cue, +20 more at 20s, clamped to [0, 100].
pub fn engagement_score(avg_time_before_cue_click: f64) -> f64 {
    let mut score: f64 = 50.0;
    if avg_time_before_cue_click >= 10.0 {
        score += 30.0;
    }
    if avg_time_before_cue_click >= 20.0 {
        score += 20.0;
    }
    score.clamp(0.0, 100.0)
}

fn fold_page_visit(analytics: &mut UserAnalytics, event: &PageVisitEvent) {
    // Page-type bucket: both averages fold with the bucket's pre-increment
    // count, then the count moves.
    let bucket = match event.page_type {
        PageType::Story => Some(&mut analytics.page_type_analytics.story),
        PageType::Cue => Some(&mut analytics.page_type_analytics.cue),
        PageType::Activity => Some(&mut analytics.page_type_analytics.activity),
        PageType::Navigation | PageType::Other => None,
    };
    if let Some(bucket) = bucket {
        bucket.avg_time_on_page =
            fold_running_average(bucket.avg_time_on_page, bucket.pages_visited, event.time_on_page);
        bucket.avg_engagement_time = fold_running_average(
            bucket.avg_engagement_time,
            bucket.pages_visited,
            event.actual_engagement_time,
        );
        bucket.pages_visited += 1;
    }

    let interactions = &mut analytics.interaction_patterns;
    interactions.avg_interactions_per_page = fold_running_average(
        interactions.avg_interactions_per_page,
        analytics.pages_read,
        event.interactions.len() as f64,
    );
    interactions.total_interactions += event.interactions.len() as u64;
    analytics.pages_read += 1;

    for cue in &event.cue_interactions {
        let engagement = &mut analytics.cue_engagement;
        engagement.avg_time_before_click = fold_running_average(
            engagement.avg_time_before_click,
            engagement.encountered,
            cue.time_before_click,
        );
        engagement.encountered += 1;
        if cue.completed {
            engagement.completed += 1;
        }
    }
    if !event.cue_interactions.is_empty() {
        let engagement = &mut analytics.cue_engagement;
        engagement.completion_rate = recompute_ratio(engagement.completed, engagement.encountered);
        analytics.engagement_score = engagement_score(engagement.avg_time_before_click);
    }

    *analytics
        .navigation_patterns
        .by_source
        .entry(event.navigation_source.as_str().to_string())
        .or_insert(0) += 1;

    if event.print_clicks > 0 {
        analytics.print_behavior.total_print_clicks += event.print_clicks as u64;
        analytics.print_behavior.pages_with_prints += 1;
    }
}

fn fold_session_end(analytics: &mut UserAnalytics, metrics: &SessionEndMetrics) {
    let duration = metrics.total_duration as f64;
    analytics.average_session_duration = fold_running_average(
        analytics.average_session_duration,
        analytics.total_sessions,
        duration,
    );
    analytics.completion_rate = fold_running_average(
        analytics.completion_rate,
        analytics.total_sessions,
        metrics.final_progress,
    );
    analytics.total_sessions += 1;
    analytics.total_reading_time += duration;
}

pub struct AnalyticsAggregator {
    store: Arc<dyn AnalyticsStore>,
    /// Serializes every read-fold-write so two concurrent events for the
    /// same user cannot both read the same stale aggregate.
    update_lock: Mutex<()>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self {
            store,
            update_lock: Mutex::new(()),
        }
    }

    /// Creates the user's empty profile row if it does not exist yet
    /// (first-touch initialization during token issuance).
    pub fn ensure_profile(&self, user_id: usize) -> Result<UserAnalytics> {
        let _guard = self.update_lock.lock().unwrap();
        self.load_or_default(user_id)
    }

    pub fn get_user_analytics(&self, user_id: usize) -> Result<Option<UserAnalytics>> {
        self.store.get_user_analytics(user_id)
    }

    /// Folds one page-visit event into the user's profile and returns the
    /// updated aggregate.
    pub fn track_page_visit(
        &self,
        user_id: usize,
        event: &PageVisitEvent,
    ) -> Result<UserAnalytics> {
        let _guard = self.update_lock.lock().unwrap();
        let mut analytics = self.load_or_default(user_id)?;
        fold_page_visit(&mut analytics, event);
        self.store.put_user_analytics(&analytics)?;
        Ok(analytics)
    }

    /// Starts a reading session. Idempotent: a second start while a session
    /// is active returns the existing session instead of creating another.
    pub fn start_session(
        &self,
        user_id: usize,
        book_id: &str,
        device_type: Option<String>,
        browser_info: Option<String>,
    ) -> Result<ReadingSession> {
        let _guard = self.update_lock.lock().unwrap();
        if let Some(active) = self.store.get_active_session(user_id, book_id)? {
            debug!(
                "start_session: reusing active session {} for user {}",
                active.id, user_id
            );
            return Ok(active);
        }

        let session = ReadingSession {
            id: Uuid::new_v4().to_string(),
            user_id,
            book_id: book_id.to_string(),
            session_start: SystemTime::now(),
            session_end: None,
            total_duration: 0,
            pages_visited: Vec::new(),
            interactions_count: 0,
            device_type,
            browser_info,
        };
        self.store.create_session(&session)?;
        // First-touch: the profile row exists as soon as a session does.
        self.load_or_default(user_id)?;
        Ok(session)
    }

    /// Folds an in-flight progress sync into the active session, if one
    /// exists. Sessions are long-lived across many page views; syncs update
    /// the existing row in place rather than creating new ones.
    pub fn touch_active_session(
        &self,
        user_id: usize,
        book_id: &str,
        time_delta: u64,
        current_page: u32,
    ) -> Result<()> {
        let _guard = self.update_lock.lock().unwrap();
        let mut session = match self.store.get_active_session(user_id, book_id)? {
            Some(session) => session,
            None => return Ok(()),
        };
        session.total_duration += time_delta;
        if session.pages_visited.last() != Some(&current_page) {
            session.pages_visited.push(current_page);
        }
        self.store.update_session(&session)
    }

    /// Ends a session and folds its final metrics into the profile. Ending a
    /// session that is not the caller's current session is a no-op with a
    /// logged warning.
    pub fn end_session(
        &self,
        user_id: usize,
        session_id: &str,
        metrics: &SessionEndMetrics,
    ) -> Result<Option<UserAnalytics>> {
        let _guard = self.update_lock.lock().unwrap();
        let session = match self.store.get_session(session_id)? {
            Some(session) => session,
            None => {
                warn!("end_session: unknown session {}", session_id);
                return Ok(None);
            }
        };
        if session.user_id != user_id || !session.is_active() {
            warn!(
                "end_session: session {} is not user {}'s current session",
                session_id, user_id
            );
            return Ok(None);
        }

        let mut session = session;
        session.session_end = Some(SystemTime::now());
        session.total_duration = metrics.total_duration;
        session.interactions_count = metrics.interactions_count;
        self.store.update_session(&session)?;

        let mut analytics = self.load_or_default(user_id)?;
        fold_session_end(&mut analytics, metrics);
        self.store.put_user_analytics(&analytics)?;
        Ok(Some(analytics))
    }

    /// Admin wipe; the only way an aggregate row is ever reset.
    pub fn reset_user_analytics(&self, user_id: usize) -> Result<bool> {
        let _guard = self.update_lock.lock().unwrap();
        self.store.delete_user_analytics(user_id)
    }

    fn load_or_default(&self, user_id: usize) -> Result<UserAnalytics> {
        match self.store.get_user_analytics(user_id)? {
            Some(analytics) => Ok(analytics),
            None => {
                let analytics = UserAnalytics::new(user_id);
                self.store.put_user_analytics(&analytics)?;
                Ok(analytics)
            }
        }
    }
}
