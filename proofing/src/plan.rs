//! Which checks a proofing run performs.

use idv_types::{CheckKind, CheckResult};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProofingPlan {
    /// Checks whose outage defers the whole attempt.
    pub required: Vec<CheckKind>,
    /// Checks skipped with a warning when their vendor is down.
    pub optional: Vec<CheckKind>,
    /// Results already obtained earlier in the attempt, e.g. document
    /// authentication from the capture step.
    pub prior: Vec<CheckResult>,
}

impl ProofingPlan {
    /// Resolution and state-ID checks, with device fraud when enabled.
    pub fn verify_info(device_fraud: bool) -> Self {
        Self {
            required: vec![CheckKind::Resolution, CheckKind::SourceCheck],
            optional: if device_fraud {
                vec![CheckKind::DeviceFraud]
            } else {
                Vec::new()
            },
            prior: Vec::new(),
        }
    }

    pub fn document_auth() -> Self {
        Self {
            required: vec![CheckKind::DocumentAuth],
            ..Self::default()
        }
    }

    pub fn with_prior(mut self, result: CheckResult) -> Self {
        self.prior.push(result);
        self
    }

    /// Every check to run, required first.
    pub fn kinds(&self) -> impl Iterator<Item = CheckKind> + '_ {
        self.required.iter().chain(self.optional.iter()).copied()
    }
}
