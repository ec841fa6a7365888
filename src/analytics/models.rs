//! Analytics data models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Story,
    Cue,
    Activity,
    Navigation,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationSource {
    Toc,
    ChapterNav,
    SpreadNav,
    Breadcrumb,
    HomeButton,
    DirectUrl,
    #[serde(other)]
    Other,
}

impl NavigationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            NavigationSource::Toc => "toc",
            NavigationSource::ChapterNav => "chapter_nav",
            NavigationSource::SpreadNav => "spread_nav",
            NavigationSource::Breadcrumb => "breadcrumb",
            NavigationSource::HomeButton => "home_button",
            NavigationSource::DirectUrl => "direct_url",
            NavigationSource::Other => "other",
        }
    }
}

/// One sound-cue interaction observed on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CueInteraction {
    pub cue_name: String,
    /// Seconds between the cue appearing and the child clicking it.
    pub time_before_click: f64,
    pub completed: bool,
}

/// One page-visit event submitted by the reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVisitEvent {
    pub book_id: String,
    pub page_number: u32,
    pub page_type: PageType,
    pub navigation_source: NavigationSource,
    /// Wall-clock seconds the page was open.
    pub time_on_page: f64,
    /// Seconds of actual engagement (page focused, audio playing, ...).
    pub actual_engagement_time: f64,
    #[serde(default)]
    pub time_before_first_interaction: Option<f64>,
    /// Raw interaction labels, counted but not interpreted.
    #[serde(default)]
    pub interactions: Vec<String>,
    #[serde(default)]
    pub cue_interactions: Vec<CueInteraction>,
    #[serde(default)]
    pub print_clicks: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageTypeStats {
    pub pages_visited: u64,
    pub avg_time_on_page: f64,
    pub avg_engagement_time: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageTypeAnalytics {
    pub story: PageTypeStats,
    pub cue: PageTypeStats,
    pub activity: PageTypeStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CueEngagement {
    pub encountered: u64,
    pub completed: u64,
    /// Percent, recomputed from scratch on every update (unlike the running
    /// averages elsewhere in this profile).
    pub completion_rate: f64,
    pub avg_time_before_click: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionPatterns {
    pub total_interactions: u64,
    pub avg_interactions_per_page: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationPatterns {
    pub by_source: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrintBehavior {
    pub total_print_clicks: u64,
    pub pages_with_prints: u64,
}

/// One row per user; every analytics event folds into this. Never reset
/// except through the explicit admin wipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnalytics {
    pub user_id: usize,
    pub total_sessions: u64,
    /// Seconds across all ended sessions.
    pub total_reading_time: f64,
    pub average_session_duration: f64,
    pub pages_read: u64,
    /// Running average of the final progress percent reported at session end.
    pub completion_rate: f64,
    /// Bounded heuristic in [0, 100].
    pub engagement_score: f64,
    pub interaction_patterns: InteractionPatterns,
    pub page_type_analytics: PageTypeAnalytics,
    pub cue_engagement: CueEngagement,
    pub navigation_patterns: NavigationPatterns,
    pub print_behavior: PrintBehavior,
}

impl UserAnalytics {
    pub fn new(user_id: usize) -> Self {
        Self {
            user_id,
            total_sessions: 0,
            total_reading_time: 0.0,
            average_session_duration: 0.0,
            pages_read: 0,
            completion_rate: 0.0,
            engagement_score: 0.0,
            interaction_patterns: InteractionPatterns::default(),
            page_type_analytics: PageTypeAnalytics::default(),
            cue_engagement: CueEngagement::default(),
            navigation_patterns: NavigationPatterns::default(),
            print_behavior: PrintBehavior::default(),
        }
    }
}

/// One logical reading session, long-lived across many page views. Created
/// by an explicit start call, updated in place, closed by an explicit end.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingSession {
    pub id: String,
    pub user_id: usize,
    pub book_id: String,
    pub session_start: SystemTime,
    pub session_end: Option<SystemTime>,
    pub total_duration: u64,
    pub pages_visited: Vec<u32>,
    pub interactions_count: u64,
    pub device_type: Option<String>,
    pub browser_info: Option<String>,
}

impl ReadingSession {
    pub fn is_active(&self) -> bool {
        self.session_end.is_none()
    }
}

/// Final aggregate metrics supplied by the explicit end-session call.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionEndMetrics {
    pub total_duration: u64,
    #[serde(default)]
    pub interactions_count: u64,
    #[serde(default)]
    pub cues_collected: u64,
    /// Progress percent at the moment the session ended.
    #[serde(default)]
    pub final_progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_type_unknown_maps_to_other() {
        let parsed: PageType = serde_json::from_str("\"story\"").unwrap();
        assert_eq!(parsed, PageType::Story);
        let parsed: PageType = serde_json::from_str("\"weird_new_type\"").unwrap();
        assert_eq!(parsed, PageType::Other);
    }

    #[test]
    fn navigation_source_unknown_maps_to_other() {
        let parsed: NavigationSource = serde_json::from_str("\"chapter_nav\"").unwrap();
        assert_eq!(parsed, NavigationSource::ChapterNav);
        let parsed: NavigationSource = serde_json::from_str("\"teleport\"").unwrap();
        assert_eq!(parsed, NavigationSource::Other);
    }

    #[test]
    fn analytics_document_roundtrip() {
        let mut analytics = UserAnalytics::new(7);
        analytics.pages_read = 3;
        analytics
            .navigation_patterns
            .by_source
            .insert("toc".to_string(), 2);

        let json = serde_json::to_string(&analytics).unwrap();
        let parsed: UserAnalytics = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.user_id, 7);
        assert_eq!(parsed.pages_read, 3);
        assert_eq!(parsed.navigation_patterns.by_source["toc"], 2);
    }
}
