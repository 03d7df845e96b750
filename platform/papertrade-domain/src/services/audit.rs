use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub run_id: String,
    pub timestamp: i64,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        run_id: &str,
        timestamp: i64,
        stage: &str,
        symbol: Option<&str>,
        action: &str,
        details: serde_json::Value,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            timestamp,
            stage: stage.to_string(),
            symbol: symbol.map(|s| s.to_string()),
            action: action.to_string(),
            error: None,
            details,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
