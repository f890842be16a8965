//! In-memory gateway for tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use super::{DeliveryStatus, MailError, MailGateway, OutboundEmail};

#[derive(Default)]
struct State {
    sent: Vec<OutboundEmail>,
    failing: HashSet<String>,
}

/// Records every message it is asked to send. Addresses registered with
/// [`RecordingMailGateway::fail_for`] produce a transport error instead.
#[derive(Clone, Default)]
pub struct RecordingMailGateway {
    state: Arc<Mutex<State>>,
}

impl RecordingMailGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_for(&self, address: &str) {
        self.state().failing.insert(address.to_string());
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.state().sent.clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<OutboundEmail> {
        self.state()
            .sent
            .iter()
            .filter(|e| e.to == address)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MailGateway for RecordingMailGateway {
    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryStatus, MailError> {
        let mut state = self.state();
        if state.failing.contains(&email.to) {
            return Err(MailError::Transport(format!("simulated failure for {}", email.to)));
        }
        state.sent.push(email.clone());
        Ok(DeliveryStatus::Sent)
    }
}
