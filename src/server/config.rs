use super::RequestsLoggingLevel;
use crate::book_access::BookAccessSettings;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub requests_logging_level: RequestsLoggingLevel,
    pub session_secret: String,
    pub session_expiry_days: u64,
    pub book_access: BookAccessSettings,
}

#[cfg(test)]
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            requests_logging_level: RequestsLoggingLevel::None,
            session_secret: "test-session-secret".to_string(),
            session_expiry_days: 7,
            book_access: BookAccessSettings {
                secret: "test-book-secret".to_string(),
                token_expiry_days: Some(30),
                reader_base_url: "https://reader.example.com".to_string(),
                platform_id: "storynest-web".to_string(),
                library_url: "https://storynest.example.com/library".to_string(),
            },
        }
    }
}
