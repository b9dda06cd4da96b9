//! Vendor service-status flags.
//!
//! A check whose vendor is flagged as a full outage is never called. The
//! orchestrator consults [`ServiceStatus`] before any vendor is invoked.

use std::sync::atomic::{AtomicBool, Ordering};

use idv_types::{CheckKind, OtpDelivery};
use serde::{Deserialize, Serialize};

/// Configured outage flags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutageFlags {
    pub document_auth: bool,
    pub resolution: bool,
    pub source_check: bool,
    pub device_fraud: bool,
    pub address_check: bool,
    pub sms: bool,
    pub voice: bool,
    pub in_person: bool,
}

/// Live outage flags, adjustable while running.
#[derive(Debug, Default)]
pub struct ServiceStatus {
    document_auth: AtomicBool,
    resolution: AtomicBool,
    source_check: AtomicBool,
    device_fraud: AtomicBool,
    address_check: AtomicBool,
    sms: AtomicBool,
    voice: AtomicBool,
    in_person: AtomicBool,
}

impl ServiceStatus {
    pub fn new(flags: &OutageFlags) -> Self {
        Self {
            document_auth: AtomicBool::new(flags.document_auth),
            resolution: AtomicBool::new(flags.resolution),
            source_check: AtomicBool::new(flags.source_check),
            device_fraud: AtomicBool::new(flags.device_fraud),
            address_check: AtomicBool::new(flags.address_check),
            sms: AtomicBool::new(flags.sms),
            voice: AtomicBool::new(flags.voice),
            in_person: AtomicBool::new(flags.in_person),
        }
    }

    fn flag(&self, kind: CheckKind) -> &AtomicBool {
        match kind {
            CheckKind::DocumentAuth => &self.document_auth,
            CheckKind::Resolution => &self.resolution,
            CheckKind::SourceCheck => &self.source_check,
            CheckKind::DeviceFraud => &self.device_fraud,
            CheckKind::AddressCheck => &self.address_check,
        }
    }

    pub fn is_full_outage(&self, kind: CheckKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }

    pub fn set_full_outage(&self, kind: CheckKind, down: bool) {
        self.flag(kind).store(down, Ordering::Release);
        tracing::warn!(%kind, down, "vendor outage flag changed");
    }

    /// The subset of `kinds` currently flagged down.
    pub fn outages(&self, kinds: &[CheckKind]) -> Vec<CheckKind> {
        kinds
            .iter()
            .copied()
            .filter(|k| self.is_full_outage(*k))
            .collect()
    }

    pub fn delivery_outage(&self, delivery: OtpDelivery) -> bool {
        match delivery {
            OtpDelivery::Sms => self.sms.load(Ordering::Acquire),
            OtpDelivery::Voice => self.voice.load(Ordering::Acquire),
        }
    }

    pub fn set_delivery_outage(&self, delivery: OtpDelivery, down: bool) {
        match delivery {
            OtpDelivery::Sms => self.sms.store(down, Ordering::Release),
            OtpDelivery::Voice => self.voice.store(down, Ordering::Release),
        }
    }

    pub fn in_person_outage(&self) -> bool {
        self.in_person.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> OutageFlags {
        OutageFlags {
            document_auth: self.document_auth.load(Ordering::Acquire),
            resolution: self.resolution.load(Ordering::Acquire),
            source_check: self.source_check.load(Ordering::Acquire),
            device_fraud: self.device_fraud.load(Ordering::Acquire),
            address_check: self.address_check.load(Ordering::Acquire),
            sms: self.sms.load(Ordering::Acquire),
            voice: self.voice.load(Ordering::Acquire),
            in_person: self.in_person.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_flags_are_reported() {
        let status = ServiceStatus::new(&OutageFlags {
            resolution: true,
            sms: true,
            ..OutageFlags::default()
        });
        assert!(status.is_full_outage(CheckKind::Resolution));
        assert!(!status.is_full_outage(CheckKind::DocumentAuth));
        assert!(status.delivery_outage(OtpDelivery::Sms));
        assert!(!status.delivery_outage(OtpDelivery::Voice));
        assert_eq!(
            status.outages(&[CheckKind::DocumentAuth, CheckKind::Resolution]),
            vec![CheckKind::Resolution]
        );
    }

    #[test]
    fn flags_toggle_at_runtime() {
        let status = ServiceStatus::default();
        status.set_full_outage(CheckKind::DeviceFraud, true);
        assert!(status.snapshot().device_fraud);
        status.set_full_outage(CheckKind::DeviceFraud, false);
        assert!(!status.is_full_outage(CheckKind::DeviceFraud));
    }
}
