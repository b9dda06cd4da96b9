//! Mock vendors.
//!
//! [`MockClient`] answers every check kind from trigger values in the
//! applicant data, so a whole proofing attempt can be steered from test input.
//! [`ScriptedClient`] replays a queue of canned outcomes and counts calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use idv_types::{
    Applicant, Attribute, CheckKind, CheckResult, OtpDelivery, Reason, ReviewStatus, Vendor,
};

use crate::{
    CheckRequest, InPersonProofer, SentOtp, Telephony, UspsProofingResult, UspsStatus,
    VendorCheckClient, VendorError,
};

/// Document numbers with this prefix fail document authentication.
pub const FAILING_DOCUMENT_PREFIX: &str = "FAIL";
/// Document numbers with this prefix fail the state-ID record check.
pub const FAILING_STATE_ID_PREFIX: &str = "0000";
/// First names with this prefix fail resolution on the first name.
pub const FAILING_NAME_PREFIX: &str = "Bad";
/// This first name makes resolution time out on every try.
pub const TIMEOUT_NAME: &str = "Timeout";
pub const FAILING_SSN: &str = "123456780";
/// Resolution cannot confirm this zipcode; the state-ID check can.
pub const UNVERIFIABLE_ZIPCODE: &str = "00000";
/// Phones ending in these digits fail the phone-finder check and OTP delivery.
pub const FAILING_PHONE_SUFFIX: &str = "5555550000";
/// Device-profiling session ids steering the device-fraud verdict.
pub const REVIEW_SESSION: &str = "review";
pub const REJECT_SESSION: &str = "reject";
pub const TIMEOUT_SESSION: &str = "timeout";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Trigger-driven mock for any check kind.
#[derive(Clone, Debug)]
pub struct MockClient {
    kind: CheckKind,
    vendor: Vendor,
}

impl MockClient {
    pub fn new(kind: CheckKind) -> Self {
        Self {
            kind,
            vendor: Vendor::Mock,
        }
    }

    /// Report results under another vendor name.
    pub fn with_vendor(mut self, vendor: Vendor) -> Self {
        self.vendor = vendor;
        self
    }

    /// One mock per check kind.
    pub fn all() -> Vec<Arc<dyn VendorCheckClient>> {
        [
            CheckKind::DocumentAuth,
            CheckKind::Resolution,
            CheckKind::SourceCheck,
            CheckKind::DeviceFraud,
            CheckKind::AddressCheck,
        ]
        .into_iter()
        .map(|kind| Arc::new(MockClient::new(kind)) as Arc<dyn VendorCheckClient>)
        .collect()
    }

    fn transaction_id(&self, request: &CheckRequest) -> String {
        let hex = request.attempt_id.to_hex();
        format!("mock-{}-{}", self.kind, &hex[..8])
    }

    fn document_auth(&self, applicant: &Applicant) -> CheckResult {
        if applicant.document.id_number.starts_with(FAILING_DOCUMENT_PREFIX) {
            return CheckResult::failed(self.kind, self.vendor, vec![Reason::new("doc_auth_failed")]);
        }
        let mut result = CheckResult::passed(self.kind, self.vendor);
        result.document_type = Some(applicant.document.document_type);
        result
    }

    fn resolution(&self, applicant: &Applicant) -> Result<CheckResult, VendorError> {
        let doc = &applicant.document;
        if doc.first_name == TIMEOUT_NAME {
            return Err(VendorError::Timeout);
        }
        if doc.first_name.starts_with(FAILING_NAME_PREFIX) {
            return Ok(CheckResult::failed(
                self.kind,
                self.vendor,
                vec![Reason::for_attribute("name_mismatch", Attribute::FirstName)],
            ));
        }
        if applicant.ssn.expose() == FAILING_SSN {
            return Ok(CheckResult::failed(
                self.kind,
                self.vendor,
                vec![Reason::for_attribute("ssn_not_found", Attribute::Ssn)],
            ));
        }
        if doc.address.zipcode == UNVERIFIABLE_ZIPCODE {
            let mut result = CheckResult::failed(
                self.kind,
                self.vendor,
                vec![Reason::for_attribute("address_not_verified", Attribute::Address)],
            )
            .with_verified([Attribute::FirstName, Attribute::LastName, Attribute::Dob, Attribute::Ssn]);
            result.attributes_requiring_additional_verification.insert(Attribute::Address);
            result.can_pass_with_additional_verification = true;
            return Ok(result);
        }
        Ok(CheckResult::passed(self.kind, self.vendor).with_verified([
            Attribute::FirstName,
            Attribute::LastName,
            Attribute::Dob,
            Attribute::Address,
            Attribute::Ssn,
        ]))
    }

    fn source_check(&self, applicant: &Applicant) -> CheckResult {
        if applicant.document.id_number.starts_with(FAILING_STATE_ID_PREFIX) {
            return CheckResult::failed(
                self.kind,
                self.vendor,
                vec![Reason::for_attribute("state_id_mismatch", Attribute::StateIdNumber)],
            );
        }
        CheckResult::passed(self.kind, self.vendor).with_verified([
            Attribute::FirstName,
            Attribute::LastName,
            Attribute::Dob,
            Attribute::Address,
            Attribute::StateIdNumber,
        ])
    }

    fn device_fraud(&self, session: Option<&str>) -> Result<CheckResult, VendorError> {
        let status = match session {
            Some(TIMEOUT_SESSION) => return Err(VendorError::Timeout),
            Some(REVIEW_SESSION) => ReviewStatus::Review,
            Some(REJECT_SESSION) => ReviewStatus::Reject,
            _ => ReviewStatus::Pass,
        };
        let result = if status == ReviewStatus::Pass {
            CheckResult::passed(self.kind, self.vendor)
        } else {
            CheckResult::failed(self.kind, self.vendor, vec![Reason::new("device_risk")])
        };
        Ok(result.with_review_status(status))
    }

    fn phone_finder(&self, applicant: &Applicant) -> CheckResult {
        match &applicant.phone {
            Some(phone) if !phone.ends_with(FAILING_PHONE_SUFFIX) => {
                CheckResult::passed(self.kind, self.vendor).with_verified([Attribute::Address])
            }
            _ => CheckResult::failed(self.kind, self.vendor, vec![Reason::new("phone_not_owned")]),
        }
    }
}

#[async_trait]
impl VendorCheckClient for MockClient {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn check(&self, request: &CheckRequest) -> Result<CheckResult, VendorError> {
        let applicant = &request.applicant;
        let result = match self.kind {
            CheckKind::DocumentAuth => self.document_auth(applicant),
            CheckKind::Resolution => self.resolution(applicant)?,
            CheckKind::SourceCheck => self.source_check(applicant),
            CheckKind::DeviceFraud => self.device_fraud(request.threatmetrix_session_id.as_deref())?,
            CheckKind::AddressCheck => self.phone_finder(applicant),
        };
        Ok(result.with_transaction_id(self.transaction_id(request)))
    }
}

/// Replays queued outcomes; passes once the queue is empty.
#[derive(Debug)]
pub struct ScriptedClient {
    kind: CheckKind,
    script: Mutex<VecDeque<Result<CheckResult, VendorError>>>,
    calls: AtomicU32,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new(kind: CheckKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            delay: None,
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, outcome: Result<CheckResult, VendorError>) {
        lock(&self.script).push_back(outcome);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VendorCheckClient for ScriptedClient {
    fn vendor(&self) -> Vendor {
        Vendor::Mock
    }

    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn check(&self, _request: &CheckRequest) -> Result<CheckResult, VendorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = lock(&self.script).pop_front();
        next.unwrap_or_else(|| Ok(CheckResult::passed(self.kind, Vendor::Mock)))
    }
}

/// In-person provider double. Enrollments report `InProgress` until a status
/// is set for their unique id.
#[derive(Debug, Default)]
pub struct MockInPersonProofer {
    statuses: Mutex<HashMap<String, Result<UspsStatus, VendorError>>>,
    scheduled: Mutex<Vec<String>>,
    requests: AtomicU32,
}

impl MockInPersonProofer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, unique_id: &str, status: UspsStatus) {
        lock(&self.statuses).insert(unique_id.to_string(), Ok(status));
    }

    pub fn set_error(&self, unique_id: &str, error: VendorError) {
        lock(&self.statuses).insert(unique_id.to_string(), Err(error));
    }

    pub fn scheduled(&self) -> Vec<String> {
        lock(&self.scheduled).clone()
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InPersonProofer for MockInPersonProofer {
    async fn schedule_in_person_enrollment(
        &self,
        unique_id: &str,
        _enrollment_code: &str,
        _applicant: &Applicant,
    ) -> Result<(), VendorError> {
        lock(&self.scheduled).push(unique_id.to_string());
        Ok(())
    }

    async fn request_proofing_results(
        &self,
        unique_id: &str,
        _enrollment_code: &str,
    ) -> Result<UspsProofingResult, VendorError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let status = lock(&self.statuses)
            .get(unique_id)
            .cloned()
            .unwrap_or(Ok(UspsStatus::InProgress))?;
        Ok(UspsProofingResult::new(status))
    }
}

/// Records every OTP instead of sending it.
#[derive(Debug, Default)]
pub struct MockTelephony {
    sent: Mutex<Vec<SentOtp>>,
}

impl MockTelephony {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentOtp> {
        lock(&self.sent).clone()
    }

    pub fn last_code(&self) -> Option<String> {
        lock(&self.sent).last().map(|m| m.code.clone())
    }
}

#[async_trait]
impl Telephony for MockTelephony {
    async fn send_otp(&self, phone: &str, code: &str, delivery: OtpDelivery) -> Result<(), VendorError> {
        if phone.ends_with(FAILING_PHONE_SUFFIX) {
            return Err(VendorError::Rejected("undeliverable number".into()));
        }
        lock(&self.sent).push(SentOtp {
            phone: phone.to_string(),
            code: code.to_string(),
            delivery,
        });
        Ok(())
    }
}
