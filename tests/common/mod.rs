#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use time_study_timer::{
    state::{Step, StepId, StudyId, StudyPatch, StudyStatus, TimeStudy},
    RemoteSync, TimerError,
};

/// In-memory backend that records every call and can be told to fail or stall
#[derive(Default)]
pub struct ScriptedRemote {
    studies: Mutex<HashMap<StudyId, TimeStudy>>,
    calls: Mutex<Vec<String>>,
    fail_next: Mutex<Option<TimerError>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedRemote {
    pub fn with_study(study: TimeStudy) -> Arc<Self> {
        let remote = Self::default();
        remote.studies.lock().unwrap().insert(study.id, study);
        Arc::new(remote)
    }

    pub fn fail_next(&self, error: TimerError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    pub fn stall(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stored(&self, study_id: StudyId) -> TimeStudy {
        self.studies.lock().unwrap()[&study_id].clone()
    }

    async fn enter(&self, call: String) -> Result<(), TimerError> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.fail_next.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteSync for ScriptedRemote {
    async fn fetch_study(&self, study_id: StudyId) -> Result<TimeStudy, TimerError> {
        self.enter(format!("fetch {}", study_id)).await?;
        self.studies
            .lock()
            .unwrap()
            .get(&study_id)
            .cloned()
            .ok_or_else(|| TimerError::NotFound(format!("study {}", study_id)))
    }

    async fn update_study(&self, study_id: StudyId, patch: &StudyPatch) -> Result<TimeStudy, TimerError> {
        self.enter(format!("update {} {:?}", study_id, patch.status)).await?;
        let mut studies = self.studies.lock().unwrap();
        let study = studies
            .get_mut(&study_id)
            .ok_or_else(|| TimerError::NotFound(format!("study {}", study_id)))?;
        if let Some(status) = patch.status {
            study.status = status;
        }
        if let Some(total) = patch.actual_total_seconds {
            study.actual_total_seconds = total;
        }
        if let Some(notes) = &patch.notes {
            study.notes = Some(notes.clone());
        }
        Ok(study.clone())
    }

    async fn save_step_time(&self, step_id: StepId, actual_seconds: u64) -> Result<Step, TimerError> {
        self.enter(format!("save step {} {}", step_id, actual_seconds)).await?;
        let mut studies = self.studies.lock().unwrap();
        let step = studies
            .values_mut()
            .flat_map(|s| s.steps.iter_mut())
            .find(|s| s.id == step_id)
            .ok_or_else(|| TimerError::NotFound(format!("step {}", step_id)))?;
        step.actual_seconds = Some(actual_seconds);
        Ok(step.clone())
    }
}

/// A three-step study; step 2 already carries a saved time of 90s
pub fn milling_study(status: StudyStatus) -> TimeStudy {
    let step = |id: StepId, order: u32, name: &str, actual: Option<u64>| Step {
        id,
        order,
        name: name.to_string(),
        estimated_seconds: Some(120),
        actual_seconds: actual,
        notes: None,
    };
    TimeStudy {
        id: 1,
        name: "Milling Operation XYZ".to_string(),
        status,
        estimated_total_seconds: Some(1_800),
        actual_total_seconds: None,
        notes: None,
        steps: vec![
            step(1, 1, "Setup machine", None),
            step(2, 2, "Load material", Some(90)),
            step(3, 3, "Run first pass", None),
        ],
    }
}
