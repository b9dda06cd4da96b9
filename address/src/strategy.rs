//! The contract shared by every address confirmation strategy.

use async_trait::async_trait;
pub use idv_types::Outcome;
use idv_types::{
    AddressMethod, Applicant, AttemptId, EnrollmentId, GpoCodeId, OtpDelivery, ProfileId,
    Timestamp, UserId,
};
use idv_vendors::CheckRequest;

use crate::AddressError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressStatus {
    Verified,
    Pending,
    Failed,
}

/// Handle returned when confirmation starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingToken {
    OtpSent {
        expires_at: Timestamp,
        /// Sends left in the current window.
        remaining: u32,
    },
    LetterQueued {
        code_id: GpoCodeId,
        expires_at: Timestamp,
    },
    Enrollment {
        enrollment_id: EnrollmentId,
        /// Shown to the user; presented at the counter.
        enrollment_code: String,
        expires_at: Timestamp,
    },
}

/// Whose address is being confirmed. Phone confirmation runs before the
/// profile exists; the mailed and in-person strategies need one.
#[derive(Clone, Copy, Debug)]
pub struct AddressSubject {
    pub user_id: UserId,
    pub attempt_id: AttemptId,
    pub profile_id: Option<ProfileId>,
}

impl AddressSubject {
    pub fn profile(&self, method: AddressMethod) -> Result<ProfileId, AddressError> {
        self.profile_id.ok_or(AddressError::NoProfile { method })
    }
}

#[derive(Clone, Debug)]
pub enum InitiateParams {
    Phone {
        /// E.164.
        phone: String,
        delivery: OtpDelivery,
        /// Applicant data for the phone-ownership check.
        request: CheckRequest,
    },
    Gpo,
    InPerson {
        applicant: Applicant,
    },
}

#[async_trait]
pub trait AddressConfirmation: Send + Sync {
    fn method(&self) -> AddressMethod;

    /// Start confirmation. Refused with `RateLimited` when the user is
    /// locked out of the operation.
    async fn initiate(
        &self,
        subject: &AddressSubject,
        params: InitiateParams,
    ) -> Result<Outcome<PendingToken>, AddressError>;

    /// Current state, always read from the store.
    fn status(&self, subject: &AddressSubject) -> Result<AddressStatus, AddressError>;
}
