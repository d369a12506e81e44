use std::{sync::Arc, time::Duration};

use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    core::{
        hint_code::HintCode,
        order::{CollectState, CompletionData, Order, OrderRef, OrderStatus},
    },
    gateway::{Gateway, ProviderError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Measured from the creation of the order.
    pub timeout: Duration,
    pub max_transport_retries: u32,
}

#[derive(Debug)]
pub enum PollStep {
    /// The order is still pending; the snapshot refines what the user should do.
    Pending(OrderStatus),
    Finished(PollOutcome),
}

#[derive(Debug)]
pub enum PollOutcome {
    Complete(CompletionData),
    Failed(Option<HintCode>),
    /// The budget ran out. The provider has already been asked to cancel.
    TimedOut,
    Error(ProviderError),
}

/// Drives one order from `pending` to a terminal outcome.
///
/// `collect` is called immediately and then once per interval. Calls never
/// overlap, so snapshots arrive in the order they were requested.
#[derive(Debug)]
pub struct StatusPoller {
    gateway: Arc<dyn Gateway>,
    order_ref: OrderRef,
    deadline: Instant,
    interval: Interval,
    max_transport_retries: u32,
    retries_left: u32,
    attempts: u32,
    finished: bool,
}

impl StatusPoller {
    pub fn new(gateway: Arc<dyn Gateway>, order: &Order, policy: PollPolicy) -> Self {
        let mut interval = time::interval(policy.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            gateway,
            order_ref: order.order_ref().clone(),
            deadline: order.created_at() + policy.timeout,
            interval,
            max_transport_retries: policy.max_transport_retries,
            retries_left: policy.max_transport_retries,
            attempts: 0,
            finished: false,
        }
    }

    /// Number of `collect` calls made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait for the next pending snapshot or the terminal outcome.
    ///
    /// Returns `None` once a terminal outcome has been reported.
    pub async fn next(&mut self) -> Option<PollStep> {
        if self.finished {
            return None;
        }

        loop {
            self.interval.tick().await;

            if Instant::now() >= self.deadline {
                return Some(self.time_out().await);
            }

            self.attempts += 1;
            let response =
                match time::timeout_at(self.deadline, self.gateway.collect(&self.order_ref)).await
                {
                    Ok(response) => response,
                    Err(_) => return Some(self.time_out().await),
                };

            let status = match response {
                Ok(status) => status,
                Err(ProviderError::Transport(e)) if self.retries_left > 0 => {
                    self.retries_left -= 1;
                    warn!(
                        order_ref = %self.order_ref,
                        retries_left = self.retries_left,
                        "collect failed, retrying: {e:#}"
                    );
                    continue;
                }
                Err(e) => return Some(self.finish(PollOutcome::Error(e))),
            };

            self.retries_left = self.max_transport_retries;

            if status.order_ref != self.order_ref {
                warn!(
                    expected = %self.order_ref,
                    received = %status.order_ref,
                    "ignoring collect response for another order"
                );
                continue;
            }

            return Some(match status.status {
                CollectState::Pending => {
                    debug!(order_ref = %self.order_ref, hint = ?status.hint_code, "order pending");
                    PollStep::Pending(status)
                }
                CollectState::Complete => match status.completion_data {
                    Some(completion) => self.finish(PollOutcome::Complete(completion)),
                    None => self.finish(PollOutcome::Error(
                        ProviderError::MissingCompletionData(status.order_ref),
                    )),
                },
                CollectState::Failed => self.finish(PollOutcome::Failed(status.hint_code)),
            });
        }
    }

    fn finish(&mut self, outcome: PollOutcome) -> PollStep {
        self.finished = true;
        PollStep::Finished(outcome)
    }

    async fn time_out(&mut self) -> PollStep {
        info!(
            order_ref = %self.order_ref,
            attempts = self.attempts,
            "order timed out, cancelling"
        );
        if let Err(e) = self.gateway.cancel(&self.order_ref).await {
            warn!(order_ref = %self.order_ref, "failed to cancel timed out order: {e}");
        }
        self.finish(PollOutcome::TimedOut)
    }
}
