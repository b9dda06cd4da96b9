//! Phone confirmation: phone-ownership check, then an OTP loop.

use std::sync::Arc;

use async_trait::async_trait;
use idv_crypto::{generate_numeric_code, Fingerprinter, RandomSource};
use idv_ratelimit::RateLimiter;
use idv_store::IdvStore;
use idv_types::{
    AddressMethod, Clock, Effect, IdvEvent, IdvParams, OtpDelivery, PhoneOtpChallenge,
    RateLimitType, Reason, Timestamp, Vendor,
};
use idv_vendors::{CheckRequest, GuardedClient, ServiceStatus, Telephony};

use crate::{
    AddressConfirmation, AddressError, AddressStatus, AddressSubject, InitiateParams, Outcome,
    PendingToken,
};

/// Result of one OTP submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtpCheck {
    Confirmed {
        phone: String,
        vendor: Vendor,
        confirmed_at: Timestamp,
    },
    Incorrect {
        /// Verifications left before the user is locked out.
        remaining: u32,
    },
}

pub struct PhoneConfirmation {
    store: Arc<dyn IdvStore>,
    limiter: RateLimiter,
    telephony: Arc<dyn Telephony>,
    phone_finder: GuardedClient,
    status: Arc<ServiceStatus>,
    fingerprinter: Arc<Fingerprinter>,
    rng: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    otp_length: usize,
    otp_validity_secs: u64,
}

impl PhoneConfirmation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn IdvStore>,
        limiter: RateLimiter,
        telephony: Arc<dyn Telephony>,
        phone_finder: GuardedClient,
        status: Arc<ServiceStatus>,
        fingerprinter: Arc<Fingerprinter>,
        rng: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
        params: &IdvParams,
    ) -> Self {
        Self {
            store,
            limiter,
            telephony,
            phone_finder,
            status,
            fingerprinter,
            rng,
            clock,
            otp_length: params.otp_length,
            otp_validity_secs: params.otp_validity_secs,
        }
    }

    /// Check the number belongs to the applicant, then send a fresh code.
    ///
    /// A new send replaces any outstanding challenge for the attempt. A user
    /// locked out of verification cannot request more codes.
    pub async fn send_otp(
        &self,
        subject: &AddressSubject,
        phone: &str,
        delivery: OtpDelivery,
        mut request: CheckRequest,
    ) -> Result<Outcome<PendingToken>, AddressError> {
        if self.status.delivery_outage(delivery) {
            return Err(AddressError::DeliveryUnavailable(delivery));
        }
        let now = self.clock.now();
        let user = subject.user_id;
        self.limiter.ensure_unlimited(
            user,
            &[
                RateLimitType::PhoneOtp,
                RateLimitType::PhoneConfirmation,
                RateLimitType::ProofAddress,
            ],
            now,
        )?;

        let mut effects = Vec::new();

        // The ownership check only needs to pass once per number.
        let already_checked = self
            .store
            .get_otp(subject.attempt_id)?
            .is_some_and(|c| c.phone == phone && c.vendor_check_passed);
        if !already_checked {
            self.limiter.attempt(user, RateLimitType::ProofAddress, now)?;
            request.applicant.phone = Some(phone.to_string());
            let result = self.phone_finder.run(&request).await;
            if !result.success {
                tracing::info!(attempt_id = %subject.attempt_id, timed_out = result.timed_out, "phone finder did not match");
                let mut reasons = result.reasons;
                if result.timed_out {
                    reasons.push(Reason::new("address_check_timed_out"));
                }
                return Err(AddressError::PhoneNotVerified(reasons));
            }
        }

        let sent = self.limiter.attempt(user, RateLimitType::PhoneOtp, now)?;
        if sent.remaining == 0 {
            effects.push(Effect::from(IdvEvent::RateLimited {
                user_id: user,
                kind: RateLimitType::PhoneOtp,
            }));
        }

        let code = generate_numeric_code(self.rng.as_ref(), self.otp_length)?;
        self.telephony.send_otp(phone, &code, delivery).await?;

        let challenge = PhoneOtpChallenge {
            attempt_id: subject.attempt_id,
            user_id: user,
            phone: phone.to_string(),
            otp_fingerprint: self.fingerprinter.fingerprint(&code),
            delivery,
            sent_at: now,
            expires_at: now.plus_secs(self.otp_validity_secs),
            confirmed_at: None,
            vendor_check_passed: true,
        };
        self.store.put_otp(&challenge)?;
        tracing::info!(attempt_id = %subject.attempt_id, ?delivery, "otp sent");
        effects.push(
            IdvEvent::PhoneOtpSent {
                attempt_id: subject.attempt_id,
            }
            .into(),
        );

        Ok(Outcome::new(
            PendingToken::OtpSent {
                expires_at: challenge.expires_at,
                remaining: sent.remaining,
            },
            effects,
        ))
    }

    /// Check a submitted code. Every miss counts against verification; the
    /// last allowed miss locks the user out of both verify and send. A user
    /// out of sends is locked out of verification too.
    pub fn verify_otp(
        &self,
        subject: &AddressSubject,
        code: &str,
    ) -> Result<Outcome<OtpCheck>, AddressError> {
        let now = self.clock.now();
        let user = subject.user_id;
        self.limiter.ensure_unlimited(
            user,
            &[RateLimitType::PhoneConfirmation, RateLimitType::PhoneOtp],
            now,
        )?;

        let mut challenge = self
            .store
            .get_otp(subject.attempt_id)?
            .ok_or(AddressError::NoChallenge(subject.attempt_id))?;
        let vendor = self.phone_finder.vendor();

        if let Some(confirmed_at) = challenge.confirmed_at {
            return Ok(Outcome::quiet(OtpCheck::Confirmed {
                phone: challenge.phone,
                vendor,
                confirmed_at,
            }));
        }
        if challenge.is_expired(now) {
            return Err(AddressError::CodeExpired);
        }

        if self.fingerprinter.matches(code, &challenge.otp_fingerprint) {
            challenge.confirmed_at = Some(now);
            self.store.put_otp(&challenge)?;
            tracing::info!(attempt_id = %subject.attempt_id, "otp confirmed");
            let event = IdvEvent::PhoneOtpVerified {
                attempt_id: subject.attempt_id,
                success: true,
            };
            return Ok(Outcome::new(
                OtpCheck::Confirmed {
                    phone: challenge.phone,
                    vendor,
                    confirmed_at: now,
                },
                vec![event.into()],
            ));
        }

        let left = self
            .limiter
            .attempt(user, RateLimitType::PhoneConfirmation, now)?;
        let mut effects = vec![Effect::from(IdvEvent::PhoneOtpVerified {
            attempt_id: subject.attempt_id,
            success: false,
        })];
        if left.remaining == 0 {
            tracing::warn!(%user, "otp verification locked out");
            effects.push(
                IdvEvent::RateLimited {
                    user_id: user,
                    kind: RateLimitType::PhoneConfirmation,
                }
                .into(),
            );
        }
        Ok(Outcome::new(
            OtpCheck::Incorrect {
                remaining: left.remaining,
            },
            effects,
        ))
    }
}

#[async_trait]
impl AddressConfirmation for PhoneConfirmation {
    fn method(&self) -> AddressMethod {
        AddressMethod::Phone
    }

    async fn initiate(
        &self,
        subject: &AddressSubject,
        params: InitiateParams,
    ) -> Result<Outcome<PendingToken>, AddressError> {
        match params {
            InitiateParams::Phone {
                phone,
                delivery,
                request,
            } => self.send_otp(subject, &phone, delivery, request).await,
            _ => Err(AddressError::WrongParams(AddressMethod::Phone)),
        }
    }

    fn status(&self, subject: &AddressSubject) -> Result<AddressStatus, AddressError> {
        let now = self.clock.now();
        let challenge = self.store.get_otp(subject.attempt_id)?;
        if challenge.as_ref().is_some_and(|c| c.confirmed_at.is_some()) {
            return Ok(AddressStatus::Verified);
        }
        if self
            .limiter
            .is_limited(subject.user_id, RateLimitType::PhoneConfirmation, now)?
        {
            return Ok(AddressStatus::Failed);
        }
        Ok(match challenge {
            Some(c) if c.is_expired(now) => AddressStatus::Failed,
            _ => AddressStatus::Pending,
        })
    }
}
