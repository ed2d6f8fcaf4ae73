use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    configuration::DispatchSettings,
    dal::{account_db::AccountRepository, sent_db::SentLedger, sent_db::SentRepository, StoreError},
    domain::{
        account::{AccountHandle, SenderMode},
        identity::Identity,
        message::{probe_message, Message},
    },
};

use super::{AccountPool, CancelFlag, Clock, MessageTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchOutcome {
    Completed,
    Exhausted,
    DeliverabilityAlarm,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub probes: usize,
    /// Queue entries never attempted.
    pub remaining: usize,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchState {
    Idle,
    Selecting,
    Sending(usize),
    Probing,
    Terminated(DispatchOutcome),
}

enum ProbeVerdict {
    Clean,
    Flagged,
    Inconclusive,
}

// Duplicates inside the file are kept; the ledger check during the run
// turns the repeats into no-ops.
pub fn build_queue<R: SentRepository>(identities: &[Identity], ledger: &SentLedger<R>) -> Vec<String> {
    identities
        .iter()
        .filter(|identity| !ledger.contains(&identity.email))
        .map(|identity| identity.email.clone())
        .collect()
}

pub struct Dispatcher<'a, A, L, T, C>
where
    A: AccountRepository,
    L: SentRepository,
    T: MessageTransport,
    C: Clock,
{
    pub pool: &'a mut AccountPool<A>,
    pub ledger: &'a mut SentLedger<L>,
    pub transport: &'a T,
    pub clock: &'a C,
    pub cancel: &'a CancelFlag,
    pub settings: &'a DispatchSettings,
}

impl<'a, A, L, T, C> Dispatcher<'a, A, L, T, C>
where
    A: AccountRepository,
    L: SentRepository,
    T: MessageTransport,
    C: Clock,
{
    pub async fn run(&mut self, queue: &[String]) -> Result<DispatchReport, StoreError> {
        log::info!("Found {} unique emails to send", queue.len());

        let message = Message {
            subject: self.settings.subject.clone(),
            body: self.settings.body.clone(),
        };
        let mut report = DispatchReport {
            sent: 0,
            failed: 0,
            skipped: 0,
            probes: 0,
            remaining: 0,
            outcome: DispatchOutcome::Completed,
        };

        let mut position = 0;
        let mut since_probe = 0;
        let mut sender: Option<AccountHandle> = None;
        let mut state = DispatchState::Idle;

        loop {
            state = match state {
                DispatchState::Idle => {
                    if self.cancel.is_cancelled() {
                        DispatchState::Terminated(DispatchOutcome::Cancelled)
                    } else if position >= queue.len() {
                        DispatchState::Terminated(DispatchOutcome::Completed)
                    } else if self.ledger.contains(&queue[position]) {
                        log::info!("Already sent to {}, skipping", queue[position]);
                        report.skipped += 1;
                        position += 1;
                        DispatchState::Idle
                    } else {
                        DispatchState::Selecting
                    }
                }
                DispatchState::Selecting => match self.pool.select_sender(SenderMode::Normal) {
                    Some(account) => {
                        sender = Some(account);
                        DispatchState::Sending(position)
                    }
                    None => {
                        log::warn!("All accounts have reached their daily limit");
                        DispatchState::Terminated(DispatchOutcome::Exhausted)
                    }
                },
                DispatchState::Sending(index) => {
                    let to = &queue[index];
                    position += 1;

                    let Some(account) = sender.take() else {
                        log::error!("No sender selected for {}", to);
                        state = DispatchState::Idle;
                        continue;
                    };

                    match self.transport.send_message(&account, to, &message).await {
                        Ok(()) => {
                            log::info!("Sent to: {} using {}", to, account.email);
                            self.ledger.commit(to).await?;
                            if let Err(e) = self.pool.record_send(&account).await {
                                log::error!(
                                    "Failed to save sent count for {}, correct it manually: {:?}",
                                    account.email,
                                    e
                                );
                            }
                            report.sent += 1;
                            since_probe += 1;

                            if self.settings.probe_interval > 0
                                && since_probe >= self.settings.probe_interval
                            {
                                DispatchState::Probing
                            } else {
                                self.pace(position < queue.len()).await;
                                DispatchState::Idle
                            }
                        }
                        Err(e) => {
                            log::error!("Failed to send from {} to {}: {:?}", account.email, to, e);
                            report.failed += 1;
                            DispatchState::Idle
                        }
                    }
                }
                DispatchState::Probing => {
                    since_probe = 0;
                    report.probes += 1;

                    match self.probe().await {
                        ProbeVerdict::Flagged => {
                            log::error!(
                                "Test email detected in {} folder, emails are being marked as spam. Terminating.",
                                self.settings.unwanted_folder
                            );
                            DispatchState::Terminated(DispatchOutcome::DeliverabilityAlarm)
                        }
                        ProbeVerdict::Clean | ProbeVerdict::Inconclusive => {
                            self.pace(position < queue.len()).await;
                            DispatchState::Idle
                        }
                    }
                }
                DispatchState::Terminated(outcome) => {
                    report.outcome = outcome;
                    report.remaining = queue.len() - position;
                    break;
                }
            };
        }

        log::info!(
            "Finished sending emails: {} sent, {} failed, {} skipped, {} remaining ({:?})",
            report.sent,
            report.failed,
            report.skipped,
            report.remaining,
            report.outcome
        );

        Ok(report)
    }

    async fn probe(&self) -> ProbeVerdict {
        let Some(account) = self.pool.select_sender(SenderMode::Probe) else {
            log::warn!("No test account available, skipping spam check");
            return ProbeVerdict::Inconclusive;
        };

        let marker = Uuid::new_v4().simple().to_string();
        let message = probe_message(&marker);

        log::info!("Sending test email from {}", account.email);
        if let Err(e) = self
            .transport
            .send_message(&account, &account.email, &message)
            .await
        {
            log::error!("Failed to send test email: {:?}", e);
            return ProbeVerdict::Inconclusive;
        }

        self.clock.sleep(self.settings.probe_settle()).await;

        match self
            .transport
            .check_folder(&account, &self.settings.unwanted_folder, &marker)
            .await
        {
            Ok(true) => ProbeVerdict::Flagged,
            Ok(false) => {
                log::info!("Test email not found in {} folder", self.settings.unwanted_folder);
                ProbeVerdict::Clean
            }
            Err(e) => {
                log::error!("Failed to check spam status: {:?}", e);
                ProbeVerdict::Inconclusive
            }
        }
    }

    async fn pace(&self, more_to_send: bool) {
        if !more_to_send || !self.settings.pacing.enabled {
            return;
        }
        self.clock.sleep(self.pacing_delay()).await;
    }

    fn pacing_delay(&self) -> Duration {
        let pacing = &self.settings.pacing;
        let (low, high) = match pacing.min_secs <= pacing.max_secs {
            true => (pacing.min_secs, pacing.max_secs),
            false => (pacing.max_secs, pacing.min_secs),
        };

        let secs = rand::thread_rng().gen_range(low.max(0.0)..=high.max(0.0));
        Duration::from_secs_f64(secs)
    }
}
