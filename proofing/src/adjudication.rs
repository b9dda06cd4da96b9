//! Folding individual check results into one proofing outcome.

use std::collections::BTreeMap;

use idv_types::{
    AttemptId, CheckKind, CheckResult, FraudPendingReason, ProofingComponents, ProofingResult,
    ReviewStatus, Timestamp,
};

/// Whether resolution counts as passed once the state-ID record is considered.
///
/// A failed resolution still passes when the vendor flagged it as passable
/// with additional verification and every outstanding attribute was verified
/// by a successful state-ID check.
pub fn adjudicate_resolution(resolution: &CheckResult, state_id: Option<&CheckResult>) -> bool {
    if resolution.success {
        return true;
    }
    if !resolution.can_pass_with_additional_verification || resolution.timed_out {
        return false;
    }
    let Some(state_id) = state_id.filter(|s| s.success) else {
        return false;
    };
    !resolution.attributes_requiring_additional_verification.is_empty()
        && resolution
            .attributes_requiring_additional_verification
            .is_subset(&state_id.verified_attributes)
}

/// Device-fraud outcome: the pending reason it raises and whether it is a
/// hard reject.
fn device_fraud_outcome(
    check: Option<&CheckResult>,
    hard_reject_routes_to_review: bool,
) -> (Option<FraudPendingReason>, bool) {
    let Some(check) = check else {
        return (None, false);
    };
    if check.timed_out {
        return (Some(FraudPendingReason::ThreatmetrixReview), false);
    }
    match check.review_status {
        Some(ReviewStatus::Pass) => (None, false),
        Some(ReviewStatus::Reject) if hard_reject_routes_to_review => {
            (Some(FraudPendingReason::ThreatmetrixReject), false)
        }
        Some(ReviewStatus::Reject) => (Some(FraudPendingReason::ThreatmetrixReject), true),
        // Review, or no verdict at all.
        Some(ReviewStatus::Review) | None => (Some(FraudPendingReason::ThreatmetrixReview), false),
    }
}

/// Components satisfied by the checks that passed.
fn components_from(checks: &BTreeMap<CheckKind, CheckResult>, resolution_ok: bool) -> ProofingComponents {
    let mut components = ProofingComponents::default();
    if let Some(doc) = checks.get(&CheckKind::DocumentAuth).filter(|c| c.success) {
        components.document_check = Some(doc.vendor);
        components.document_type = doc.document_type;
    }
    if let Some(res) = checks.get(&CheckKind::Resolution).filter(|_| resolution_ok) {
        components.resolution_check = Some(res.vendor);
    }
    if let Some(src) = checks.get(&CheckKind::SourceCheck).filter(|c| c.success) {
        components.source_check = Some(src.vendor);
    }
    if let Some(device) = checks.get(&CheckKind::DeviceFraud).filter(|c| !c.timed_out) {
        components.threatmetrix = Some(true);
        components.threatmetrix_review_status = device.review_status;
    }
    components
}

/// Build the proofing result from the completed checks.
///
/// `success = document_auth && resolution && source_check && !hard_reject`,
/// where each check only counts when it was part of the run and resolution
/// is adjudicated against the state-ID record.
pub fn aggregate(
    attempt_id: AttemptId,
    checks: BTreeMap<CheckKind, CheckResult>,
    hard_reject_routes_to_review: bool,
    now: Timestamp,
) -> ProofingResult {
    let passed = |kind: CheckKind| checks.get(&kind).map_or(true, |c| c.success);

    let document_ok = passed(CheckKind::DocumentAuth);
    let source_ok = passed(CheckKind::SourceCheck);
    let resolution_ok = checks
        .get(&CheckKind::Resolution)
        .map_or(true, |r| adjudicate_resolution(r, checks.get(&CheckKind::SourceCheck)));

    let (fraud_review_pending_reason, hard_reject) = device_fraud_outcome(
        checks.get(&CheckKind::DeviceFraud),
        hard_reject_routes_to_review,
    );

    let components = components_from(&checks, resolution_ok);

    ProofingResult {
        attempt_id,
        success: document_ok && resolution_ok && source_ok && !hard_reject,
        checks,
        unavailable: Vec::new(),
        fraud_review_pending_reason,
        device_fraud_hard_reject: hard_reject,
        components,
        completed_at: now,
    }
}
