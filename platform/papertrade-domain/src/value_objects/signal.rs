use crate::value_objects::action::Action;

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub action: Action,
    pub confidence: f64,
    pub rationale: String,
}

impl Signal {
    pub fn hold(confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            confidence,
            rationale: rationale.into(),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action != Action::Hold
    }
}
