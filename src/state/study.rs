//! Time study and step records as exchanged with the study backend

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::TimerError;

pub type StudyId = u64;
pub type StepId = u64;

/// Lifecycle status of a time study
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyStatus {
    #[serde(rename = "not started")]
    NotStarted,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "scrapped")]
    Scrapped,
}

impl StudyStatus {
    /// Completed and scrapped studies accept no further timer operations
    pub fn is_terminal(self) -> bool {
        matches!(self, StudyStatus::Completed | StudyStatus::Scrapped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StudyStatus::NotStarted => "not started",
            StudyStatus::InProgress => "in progress",
            StudyStatus::Completed => "completed",
            StudyStatus::Scrapped => "scrapped",
        }
    }
}

impl Default for StudyStatus {
    fn default() -> Self {
        StudyStatus::NotStarted
    }
}

impl std::fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered sub-task of a time study
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub order: u32,
    pub name: String,
    #[serde(rename = "estimated_time", default)]
    pub estimated_seconds: Option<u64>,
    #[serde(rename = "actual_time", default)]
    pub actual_seconds: Option<u64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A recorded measurement of how long a manufacturing procedure takes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeStudy {
    pub id: StudyId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: StudyStatus,
    #[serde(rename = "estimated_total_time", default)]
    pub estimated_total_seconds: Option<u64>,
    #[serde(rename = "actual_total_time", default)]
    pub actual_total_seconds: Option<u64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl TimeStudy {
    /// Check the structural invariants every study must hold
    pub fn validate(&self) -> Result<(), TimerError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.order == 0 {
                return Err(TimerError::Validation(format!(
                    "step {} has non-positive order",
                    step.id
                )));
            }
            if !seen.insert(step.order) {
                return Err(TimerError::Validation(format!(
                    "duplicate step order {} in study {}",
                    step.order, self.id
                )));
            }
        }

        let time_allowed = matches!(self.status, StudyStatus::InProgress | StudyStatus::Completed);
        if self.actual_total_seconds.is_some() && !time_allowed {
            return Err(TimerError::Validation(format!(
                "study {} carries an actual total time while {}",
                self.id, self.status
            )));
        }

        Ok(())
    }

    /// Steps sorted by their `order` field
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    pub fn step(&self, step_id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Replace a step with its updated representation
    pub fn replace_step(&mut self, updated: Step) {
        if let Some(slot) = self.steps.iter_mut().find(|s| s.id == updated.id) {
            *slot = updated;
        }
    }
}

/// Partial study update sent to the backend.
///
/// `actual_total_seconds` is doubly optional: `None` leaves the field out of
/// the request, `Some(None)` sends an explicit `null` to clear it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudyPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StudyStatus>,
    #[serde(rename = "actual_total_time", skip_serializing_if = "Option::is_none")]
    pub actual_total_seconds: Option<Option<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl StudyPatch {
    pub fn start() -> Self {
        Self {
            status: Some(StudyStatus::InProgress),
            ..Self::default()
        }
    }

    pub fn complete(actual_total_seconds: u64, notes: Option<String>) -> Self {
        Self {
            status: Some(StudyStatus::Completed),
            actual_total_seconds: Some(Some(actual_total_seconds)),
            notes,
        }
    }

    pub fn scrap(reason: String) -> Self {
        Self {
            status: Some(StudyStatus::Scrapped),
            actual_total_seconds: Some(None),
            notes: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn step(id: StepId, order: u32) -> Step {
        Step {
            id,
            order,
            name: format!("step {}", id),
            estimated_seconds: None,
            actual_seconds: None,
            notes: None,
        }
    }

    #[test]
    fn parses_backend_representation() {
        let body = json!({
            "id": 7,
            "name": "Milling Operation XYZ",
            "status": "in progress",
            "estimated_total_time": 1800,
            "admin_id": 1,
            "steps": [
                { "id": 2, "name": "Load material", "order": 2, "estimated_time": 120, "time_study_id": 7 },
                { "id": 1, "name": "Setup machine", "order": 1, "actual_time": 90 }
            ]
        });

        let study: TimeStudy = serde_json::from_value(body).unwrap();
        assert_eq!(study.status, StudyStatus::InProgress);
        assert_eq!(study.actual_total_seconds, None);
        assert_eq!(study.estimated_total_seconds, Some(1800));
        let ordered: Vec<StepId> = study.ordered_steps().iter().map(|s| s.id).collect();
        assert_eq!(ordered, vec![1, 2]);
        assert_eq!(study.step(1).unwrap().actual_seconds, Some(90));
    }

    #[test]
    fn scrap_patch_sends_explicit_null() {
        let value = serde_json::to_value(StudyPatch::scrap("tool broke".into())).unwrap();
        assert_eq!(
            value,
            json!({ "status": "scrapped", "actual_total_time": null, "notes": "tool broke" })
        );
    }

    #[test]
    fn start_patch_only_sends_status() {
        let value = serde_json::to_value(StudyPatch::start()).unwrap();
        assert_eq!(value, json!({ "status": "in progress" }));
    }

    #[test]
    fn duplicate_orders_are_rejected() {
        let study = TimeStudy {
            id: 1,
            name: String::new(),
            status: StudyStatus::NotStarted,
            estimated_total_seconds: None,
            actual_total_seconds: None,
            notes: None,
            steps: vec![step(1, 1), step(2, 1)],
        };
        assert!(matches!(study.validate(), Err(TimerError::Validation(_))));
    }

    #[test]
    fn total_time_requires_started_study() {
        let mut study = TimeStudy {
            id: 1,
            name: String::new(),
            status: StudyStatus::NotStarted,
            estimated_total_seconds: None,
            actual_total_seconds: Some(10),
            notes: None,
            steps: vec![step(1, 3), step(2, 8)],
        };
        assert!(study.validate().is_err());

        study.status = StudyStatus::Completed;
        assert!(study.validate().is_ok());
    }
}
