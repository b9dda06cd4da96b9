use std::sync::Arc;

use proptest::prelude::*;

use idv_crypto::{Fingerprinter, ServerKey};
use idv_flow::{IdvStateMachine, StepOutcome, StepPayload};
use idv_nullables::NullRandom;
use idv_types::{
    Address, AddressMethod, AttemptId, CheckKind, CheckResult, DocumentPii, DocumentType,
    ProfileId, ProofingResult, Ssn, Step, Timestamp, UserId, Vendor,
};

/// The phone path, in canonical order.
const PHONE_PATH: [Step; 9] = [
    Step::Welcome,
    Step::Agreement,
    Step::DocumentCapture,
    Step::Ssn,
    Step::VerifyInfo,
    Step::AddressConfirmationChoice,
    Step::PhoneBranch,
    Step::EnterPassword,
    Step::PersonalKey,
];

fn machine() -> IdvStateMachine {
    IdvStateMachine::new(
        Arc::new(ServerKey::new([5; 32])),
        Arc::new(Fingerprinter::new(b"property-test-secret-material").unwrap()),
        Arc::new(NullRandom::new(17)),
    )
}

fn payload(step: Step, attempt_id: AttemptId) -> StepPayload {
    match step {
        Step::Welcome => StepPayload::Welcome,
        Step::Agreement => StepPayload::Agreement { accepted: true },
        Step::DocumentCapture => StepPayload::DocumentCapture {
            document: DocumentPii {
                first_name: "Fakey".into(),
                last_name: "McFakerson".into(),
                dob: "1938-10-06".into(),
                address: Address::default(),
                id_number: "1111111111111".into(),
                id_jurisdiction: "ND".into(),
                document_type: DocumentType::Passport,
            },
            result: CheckResult::passed(CheckKind::DocumentAuth, Vendor::Mock),
        },
        Step::Ssn => StepPayload::Ssn { ssn: Ssn::new("900123456") },
        Step::VerifyInfo => {
            let mut result = ProofingResult::service_unavailable(attempt_id, vec![], Timestamp::new(1));
            result.success = true;
            StepPayload::VerifyInfo { result }
        }
        Step::AddressConfirmationChoice => StepPayload::AddressConfirmationChoice {
            method: AddressMethod::Phone,
        },
        Step::PhoneBranch => StepPayload::PhoneBranch {
            phone: "2025550100".into(),
            vendor: Vendor::Mock,
            confirmed_at: Timestamp::new(1),
        },
        Step::EnterPassword => StepPayload::EnterPassword { profile_id: ProfileId::new(3) },
        Step::PersonalKey => StepPayload::PersonalKey { acknowledged: true },
        other => panic!("no payload for {other}"),
    }
}

proptest! {
    /// Any submission order redirects to the first incomplete predecessor
    /// and never errors.
    #[test]
    fn out_of_order_steps_redirect_to_first_incomplete(
        order in Just(PHONE_PATH.to_vec()).prop_shuffle(),
    ) {
        let m = machine();
        let mut attempt = m.start(UserId::new(1), Timestamp::new(10)).unwrap().attempt;
        let id = attempt.id;
        let mut completed: Vec<Step> = Vec::new();

        for (i, step) in order.iter().enumerate() {
            let index = PHONE_PATH.iter().position(|s| s == step).unwrap();
            let expected_redirect = PHONE_PATH[..index].iter().find(|s| !completed.contains(s)).copied();

            let t = m.advance(attempt, payload(*step, id), Timestamp::new(20 + i as u64));
            let t = match t {
                Ok(t) => t,
                Err(e) => return Err(TestCaseError::fail(format!("{step} failed: {e}"))),
            };
            match expected_redirect {
                Some(to) => prop_assert_eq!(t.outcome, StepOutcome::Redirect { to }),
                None => {
                    prop_assert!(matches!(t.outcome, StepOutcome::Advanced { .. }), "{} did not advance", step);
                    completed.push(*step);
                }
            }
            attempt = t.attempt;
        }
    }

    /// Resubmitting any completed step unchanged is a no-op.
    #[test]
    fn identical_resubmission_replays(reached in 2usize..8, pick in 0usize..8) {
        let m = machine();
        let mut attempt = m.start(UserId::new(1), Timestamp::new(10)).unwrap().attempt;
        let id = attempt.id;
        for (i, step) in PHONE_PATH[..reached].iter().enumerate() {
            attempt = m.advance(attempt, payload(*step, id), Timestamp::new(20 + i as u64)).unwrap().attempt;
        }
        let before = attempt.clone();
        let resubmitted = PHONE_PATH[pick % reached];

        let t = m.advance(attempt, payload(resubmitted, id), Timestamp::new(99)).unwrap();
        prop_assert_eq!(t.outcome, StepOutcome::Replayed { next: PHONE_PATH[reached] });
        prop_assert_eq!(t.attempt, before);
    }
}
