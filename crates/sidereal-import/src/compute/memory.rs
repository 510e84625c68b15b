//! In-memory compute provider for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{ImportError, ImportResult};
use crate::types::{Template, TemplateId};

use super::{ComputeProvider, OperationHandle, OperationStatus, TemplateRequest};

/// How registrations submitted to a [`MemoryCompute`] resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationBehaviour {
    /// Succeed with template `id` after `pending_polls` pending answers.
    Succeed {
        /// Identifier given to the created template.
        id: String,
        /// Number of polls answered with `Pending` first.
        pending_polls: usize,
    },
    /// Fail with `detail` after `pending_polls` pending answers.
    Fail {
        /// Failure detail.
        detail: String,
        /// Number of polls answered with `Pending` first.
        pending_polls: usize,
    },
    /// Stay pending forever.
    NeverComplete,
    /// Reject the registration request outright.
    Reject {
        /// Error message.
        message: String,
    },
}

#[derive(Debug)]
struct PendingOperation {
    request: TemplateRequest,
    polls: usize,
}

#[derive(Debug, Default)]
struct ComputeState {
    operations: HashMap<String, PendingOperation>,
    templates: HashMap<TemplateId, Template>,
    requests: Vec<TemplateRequest>,
    polls: usize,
}

/// Compute provider keeping templates in memory.
#[derive(Debug)]
pub struct MemoryCompute {
    behaviour: RegistrationBehaviour,
    state: Mutex<ComputeState>,
}

impl MemoryCompute {
    /// Create a provider with the given registration behaviour.
    #[must_use]
    pub fn new(behaviour: RegistrationBehaviour) -> Self {
        Self {
            behaviour,
            state: Mutex::new(ComputeState::default()),
        }
    }

    /// Provider that registers templates under `id` on the first poll.
    #[must_use]
    pub fn succeeding(id: impl Into<String>) -> Self {
        Self::new(RegistrationBehaviour::Succeed {
            id: id.into(),
            pending_polls: 0,
        })
    }

    /// Provider whose registrations fail with `detail` on the first poll.
    #[must_use]
    pub fn failing(detail: impl Into<String>) -> Self {
        Self::new(RegistrationBehaviour::Fail {
            detail: detail.into(),
            pending_polls: 0,
        })
    }

    /// Templates currently registered.
    #[must_use]
    pub fn templates(&self) -> Vec<Template> {
        self.state.lock().templates.values().cloned().collect()
    }

    /// Whether template `id` is registered.
    #[must_use]
    pub fn has_template(&self, id: &TemplateId) -> bool {
        self.state.lock().templates.contains_key(id)
    }

    /// Registration requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<TemplateRequest> {
        self.state.lock().requests.clone()
    }

    /// Number of operation polls answered so far.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.state.lock().polls
    }
}

#[async_trait]
impl ComputeProvider for MemoryCompute {
    async fn create_template(&self, request: &TemplateRequest) -> ImportResult<OperationHandle> {
        if let RegistrationBehaviour::Reject { message } = &self.behaviour {
            return Err(ImportError::compute(message.clone()));
        }

        let id = ulid::Ulid::new().to_string().to_lowercase();
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        state.operations.insert(
            id.clone(),
            PendingOperation {
                request: request.clone(),
                polls: 0,
            },
        );

        Ok(OperationHandle {
            id,
            zone: request.zone.clone(),
        })
    }

    async fn poll_operation(&self, handle: &OperationHandle) -> ImportResult<OperationStatus> {
        let mut state = self.state.lock();
        state.polls += 1;

        let operation = state
            .operations
            .get_mut(&handle.id)
            .ok_or_else(|| ImportError::compute(format!("operation not found: {}", handle.id)))?;
        operation.polls += 1;
        let polls = operation.polls;
        let request = operation.request.clone();

        match &self.behaviour {
            RegistrationBehaviour::Succeed { id, pending_polls } if polls > *pending_polls => {
                let template = Template {
                    id: TemplateId::new(id.clone()),
                    name: request.name,
                    checksum: request.checksum,
                    zone: request.zone,
                    created_at: Some(Utc::now()),
                    state: Some("ready".to_owned()),
                };
                state
                    .templates
                    .insert(template.id.clone(), template.clone());
                Ok(OperationStatus::Succeeded(template))
            }
            RegistrationBehaviour::Fail {
                detail,
                pending_polls,
            } if polls > *pending_polls => Ok(OperationStatus::Failed {
                detail: detail.clone(),
            }),
            _ => Ok(OperationStatus::Pending),
        }
    }

    async fn delete_template(&self, _zone: &str, id: &TemplateId) -> ImportResult<()> {
        if self.state.lock().templates.remove(id).is_none() {
            return Err(ImportError::compute(format!("template not found: {id}")));
        }
        Ok(())
    }
}
