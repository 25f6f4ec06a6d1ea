// Donation Raffle - Scheduler
use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn, Instrument};

use crate::{
    error::RaffleError,
    processor::{CloseOutcome, RaffleEvent, RaffleManager, ReconcileReport},
    source::{EventSink, LogSource, PriceSource},
    state::UnixTimestamp,
    utils,
};

/// Drives price refresh, donation reconciliation and raffle expiry on
/// independent timers
pub struct Scheduler<P, L, E> {
    manager: Arc<RaffleManager>,
    prices: Arc<P>,
    logs: Arc<L>,
    sink: Arc<E>,
}

/// Running scheduler tasks
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal every task to stop and wait for them to finish their current tick
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "scheduler task ended abnormally");
            }
        }
    }
}

impl<P, L, E> Scheduler<P, L, E>
where
    P: PriceSource + 'static,
    L: LogSource + 'static,
    E: EventSink + 'static,
{
    pub fn new(manager: Arc<RaffleManager>, prices: Arc<P>, logs: Arc<L>, sink: Arc<E>) -> Self {
        Self {
            manager,
            prices,
            logs,
            sink,
        }
    }

    /// Start the three timer tasks on the current runtime
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let config = self.manager.config().clone();
        let this = Arc::new(self);

        let tasks = vec![
            spawn_ticker(
                "price_refresh",
                config.price_refresh_interval(),
                shutdown_rx.clone(),
                {
                    let this = this.clone();
                    move || {
                        let this = this.clone();
                        async move { this.refresh_prices_tick().await }
                    }
                },
            ),
            spawn_ticker(
                "reconcile",
                config.reconcile_interval(),
                shutdown_rx.clone(),
                {
                    let this = this.clone();
                    move || {
                        let this = this.clone();
                        async move { this.reconcile_tick().await }
                    }
                },
            ),
            spawn_ticker("expiry", config.expiry_interval(), shutdown_rx, {
                let this = this.clone();
                move || {
                    let this = this.clone();
                    async move { this.expiry_tick(utils::now()).await }
                }
            }),
        ];

        info!("scheduler started");
        SchedulerHandle { shutdown, tasks }
    }

    /// One scheduled price refresh; failures keep the stale cache
    pub async fn refresh_prices_tick(&self) {
        match self.manager.refresh_prices(self.prices.as_ref()).await {
            Ok(count) => debug!(items = count, "scheduled price refresh done"),
            Err(RaffleError::UpstreamUnavailable(detail)) => {
                warn!(%detail, "price source unavailable, keeping cached prices")
            }
            Err(e) => error!(error = %e, "price refresh failed"),
        }
    }

    /// One scheduled reconciliation pass, publishing a deposit event per credit
    pub async fn reconcile_tick(&self) {
        let outcome = match self.manager.reconcile_donations(self.logs.as_ref()).await {
            Ok(ReconcileReport::Completed(outcome)) => outcome,
            Ok(ReconcileReport::Skipped) => return,
            Err(RaffleError::UpstreamUnavailable(detail)) => {
                warn!(%detail, "log source unavailable, retrying next tick");
                return;
            }
            Err(e) => {
                error!(error = %e, "reconciliation failed");
                return;
            }
        };

        for deposit in outcome.deposits {
            let chat_id = self.manager.chat_identity_of(&deposit.sender_id).await;
            self.sink
                .publish(RaffleEvent::Deposit { deposit, chat_id })
                .await;
        }
    }

    /// Close the raffle if it is due as of `now`, publishing the result
    pub async fn expiry_tick(&self, now: UnixTimestamp) {
        let event = match self.manager.check_expiry(now).await {
            None => return,
            Some(Ok(CloseOutcome::Drawn(result))) => {
                let winner_chat_id = self.manager.chat_identity_of(&result.winner_id).await;
                RaffleEvent::RaffleClosed {
                    result,
                    winner_chat_id,
                }
            }
            Some(Ok(CloseOutcome::NoTicketsSold {
                prize_label,
                origin_channel,
            })) => RaffleEvent::RaffleClosedNoTickets {
                prize_label,
                origin_channel,
            },
            Some(Err(e)) => {
                error!(error = %e, "automatic raffle close failed");
                return;
            }
        };
        self.sink.publish(event).await;
    }
}

fn spawn_ticker<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(
        async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tick().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("ticker stopped");
        }
        .instrument(tracing::debug_span!("scheduler", task = name)),
    )
}
