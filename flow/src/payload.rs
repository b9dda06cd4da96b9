//! Typed step submissions.

use idv_crypto::{blake2b_256, payload_digest, Fingerprinter};
use idv_types::{
    AddressMethod, CheckResult, DocumentPii, ProfileId, ProofingResult, Ssn, Step, Timestamp,
    Vendor,
};
use serde::Serialize;

use crate::FlowError;

/// What the session layer hands the machine for one step.
///
/// Vendor-backed steps carry the result the caller already obtained; the
/// machine decides what the result means for the flow without calling out.
#[derive(Clone, Debug)]
pub enum StepPayload {
    Welcome,
    Agreement {
        accepted: bool,
    },
    DocumentCapture {
        document: DocumentPii,
        result: CheckResult,
    },
    Ssn {
        ssn: Ssn,
    },
    VerifyInfo {
        result: ProofingResult,
    },
    AddressConfirmationChoice {
        method: AddressMethod,
    },
    /// The phone was confirmed through the OTP loop.
    PhoneBranch {
        phone: String,
        vendor: Vendor,
        confirmed_at: Timestamp,
    },
    GpoBranch,
    InPersonBranch,
    /// The password step created `profile_id` for this attempt.
    EnterPassword {
        profile_id: ProfileId,
    },
    PersonalKey {
        acknowledged: bool,
    },
}

/// Stable part of a proofing result: excludes timestamps and vendor
/// transaction ids so a rerun with the same verdict digests the same.
#[derive(Serialize)]
struct Verdict<'a> {
    kind: &'static str,
    vendor: Vendor,
    success: bool,
    timed_out: bool,
    document_type: Option<idv_types::DocumentType>,
    review_status: Option<idv_types::ReviewStatus>,
    reasons: Vec<&'a str>,
}

impl<'a> From<&'a CheckResult> for Verdict<'a> {
    fn from(r: &'a CheckResult) -> Self {
        Self {
            kind: r.kind.as_str(),
            vendor: r.vendor,
            success: r.success,
            timed_out: r.timed_out,
            document_type: r.document_type,
            review_status: r.review_status,
            reasons: r.reasons.iter().map(|reason| reason.code.as_str()).collect(),
        }
    }
}

impl StepPayload {
    pub fn step(&self) -> Step {
        match self {
            Self::Welcome => Step::Welcome,
            Self::Agreement { .. } => Step::Agreement,
            Self::DocumentCapture { .. } => Step::DocumentCapture,
            Self::Ssn { .. } => Step::Ssn,
            Self::VerifyInfo { .. } => Step::VerifyInfo,
            Self::AddressConfirmationChoice { .. } => Step::AddressConfirmationChoice,
            Self::PhoneBranch { .. } => Step::PhoneBranch,
            Self::GpoBranch => Step::GpoBranch,
            Self::InPersonBranch => Step::InPersonBranch,
            Self::EnterPassword { .. } => Step::EnterPassword,
            Self::PersonalKey { .. } => Step::PersonalKey,
        }
    }

    /// Digest identifying this submission for idempotent replay.
    ///
    /// PII is mixed in through a keyed fingerprint so stored digests cannot
    /// be brute-forced back into an SSN or date of birth.
    pub fn digest(&self, fingerprinter: &Fingerprinter) -> Result<[u8; 32], FlowError> {
        let keyed = |bytes: &[u8]| fingerprinter.fingerprint(&hex::encode(blake2b_256(bytes)));
        let step = self.step();

        let digest = match self {
            Self::Welcome | Self::GpoBranch | Self::InPersonBranch => {
                payload_digest(step.as_str(), &[])
            }
            Self::Agreement { accepted } | Self::PersonalKey { acknowledged: accepted } => {
                payload_digest(step.as_str(), &[&[u8::from(*accepted)]])
            }
            Self::DocumentCapture { document, result } => {
                let pii = keyed(&serde_json::to_vec(document)?);
                let verdict = serde_json::to_vec(&Verdict::from(result))?;
                payload_digest(step.as_str(), &[pii.as_bytes(), &verdict])
            }
            Self::Ssn { ssn } => {
                let pii = keyed(ssn.expose().as_bytes());
                payload_digest(step.as_str(), &[pii.as_bytes()])
            }
            Self::VerifyInfo { result } => {
                let verdicts: Vec<Verdict<'_>> = result.checks.values().map(Verdict::from).collect();
                let parts = (
                    result.success,
                    &result.unavailable,
                    result.fraud_review_pending_reason,
                    result.device_fraud_hard_reject,
                    &result.components,
                );
                payload_digest(
                    step.as_str(),
                    &[&serde_json::to_vec(&verdicts)?, &serde_json::to_vec(&parts)?],
                )
            }
            Self::AddressConfirmationChoice { method } => {
                payload_digest(step.as_str(), &[method.as_str().as_bytes()])
            }
            Self::PhoneBranch { phone, vendor, .. } => {
                let pii = keyed(phone.as_bytes());
                payload_digest(step.as_str(), &[pii.as_bytes(), vendor.as_str().as_bytes()])
            }
            Self::EnterPassword { profile_id } => {
                payload_digest(step.as_str(), &[&profile_id.to_be_bytes()])
            }
        };
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idv_types::{AttemptId, CheckKind};

    fn fp() -> Fingerprinter {
        Fingerprinter::new(b"flow-payload-digest-secret").unwrap()
    }

    #[test]
    fn ssn_digest_ignores_formatting() {
        let a = StepPayload::Ssn { ssn: Ssn::new("123-45-6789") };
        let b = StepPayload::Ssn { ssn: Ssn::new("123456789") };
        let c = StepPayload::Ssn { ssn: Ssn::new("123456780") };
        assert_eq!(a.digest(&fp()).unwrap(), b.digest(&fp()).unwrap());
        assert_ne!(a.digest(&fp()).unwrap(), c.digest(&fp()).unwrap());
    }

    #[test]
    fn digest_depends_on_secret() {
        let payload = StepPayload::Ssn { ssn: Ssn::new("123456789") };
        let other = Fingerprinter::new(b"another-secret-of-enough-length").unwrap();
        assert_ne!(payload.digest(&fp()).unwrap(), payload.digest(&other).unwrap());
    }

    #[test]
    fn rerun_with_same_verdict_digests_the_same() {
        let attempt = AttemptId::new([1; 16]);
        let run = |at: u64, txn: &str| {
            let mut result = ProofingResult::service_unavailable(attempt, vec![], Timestamp::new(at));
            result.success = true;
            let check = CheckResult::passed(CheckKind::Resolution, Vendor::Mock).with_transaction_id(txn);
            result.checks.insert(check.kind, check);
            StepPayload::VerifyInfo { result }
        };
        assert_eq!(
            run(10, "a").digest(&fp()).unwrap(),
            run(99, "b").digest(&fp()).unwrap()
        );
    }
}
