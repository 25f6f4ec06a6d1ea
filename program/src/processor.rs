// Donation Raffle - State Manager and Operation Processor
use std::{future::Future, sync::Arc};

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{
    config::RaffleConfig,
    draw::{self, DrawResult},
    error::{RaffleError, RaffleResult},
    instruction::{RaffleInstruction, RaffleOutcome},
    reconciler::{self, Deposit, ReconcileOutcome},
    source::{LogSource, PriceSource},
    state::{
        prize_display_label, ItemId, LinkTable, ParticipantId, PriceCache, RafflePool,
        TicketRange, UnixTimestamp, WalletLedger,
    },
    store::{
        load_record, save_record, FileStore, RecordStore, LINKS_KEY, PRICES_KEY, RAFFLE_KEY,
        WALLET_KEY,
    },
    utils,
};

/// Acknowledgement of a successful raffle entry
#[derive(Clone, Debug, PartialEq)]
pub struct EntryReceipt {
    pub participant_id: ParticipantId,
    /// Ticket numbers allocated by this entry
    pub range: TicketRange,
    /// Wallet balance left after the debit
    pub wallet_balance: u64,
    /// All tickets the participant now holds in the pool
    pub held_in_pool: u64,
    pub total_tickets: u64,
}

impl EntryReceipt {
    /// Participant's current fraction of the pool
    pub fn pool_share(&self) -> f64 {
        self.held_in_pool as f64 / self.total_tickets as f64
    }
}

/// How a raffle ended
#[derive(Clone, Debug, PartialEq)]
pub enum CloseOutcome {
    Drawn(DrawResult),
    /// The pool was empty and was discarded without a draw
    NoTicketsSold {
        prize_label: String,
        origin_channel: String,
    },
}

/// Result of a reconciliation request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileReport {
    /// Another pass was still running
    Skipped,
    Completed(ReconcileOutcome),
}

/// Notification produced by an operation, for the presentation layer to post
#[derive(Clone, Debug, PartialEq)]
pub enum RaffleEvent {
    Deposit {
        deposit: Deposit,
        /// Linked chat identity of the sender, if any
        chat_id: Option<String>,
    },
    RaffleClosed {
        result: DrawResult,
        /// Linked chat identity of the winner, if any
        winner_chat_id: Option<String>,
    },
    RaffleClosedNoTickets {
        prize_label: String,
        origin_channel: String,
    },
}

/// Owns the wallet ledger, the active pool, the price cache and the link
/// table, both in memory and in the record store.
///
/// Every mutation is staged on a copy, persisted, and only then committed to
/// memory, so memory never runs ahead of the store. Lock order is ledger
/// before pool.
pub struct RaffleManager {
    config: RaffleConfig,
    store: Arc<dyn RecordStore>,
    ledger: Mutex<WalletLedger>,
    pool: Mutex<Option<RafflePool>>,
    prices: RwLock<Arc<PriceCache>>,
    links: RwLock<LinkTable>,
    /// Last persisted ledger, for reads that must not wait on writers
    snapshot: watch::Sender<Arc<WalletLedger>>,
    reconcile_gate: Mutex<()>,
}

impl RaffleManager {
    /// Load every record from `store`, defaulting the ones never written
    pub fn open(config: RaffleConfig, store: Arc<dyn RecordStore>) -> RaffleResult<Self> {
        config.validate()?;

        let ledger: WalletLedger = load_record(store.as_ref(), WALLET_KEY)?.unwrap_or_default();
        let pool = load_record::<Option<RafflePool>>(store.as_ref(), RAFFLE_KEY)?.flatten();
        let prices: PriceCache = load_record(store.as_ref(), PRICES_KEY)?.unwrap_or_default();
        let links: LinkTable = load_record(store.as_ref(), LINKS_KEY)?.unwrap_or_default();

        if let Some(pool) = &pool {
            if !pool.is_consistent() {
                return Err(RaffleError::PersistenceFailure {
                    key: RAFFLE_KEY,
                    reason: "ticket ranges do not partition the pool".to_string(),
                });
            }
        }

        info!(
            wallets = ledger.balances.len(),
            watermark = ledger.last_processed_timestamp,
            raffle_active = pool.is_some(),
            prices = prices.len(),
            links = links.links.len(),
            "raffle state loaded"
        );

        let (snapshot, _) = watch::channel(Arc::new(ledger.clone()));
        Ok(Self {
            config,
            store,
            ledger: Mutex::new(ledger),
            pool: Mutex::new(pool),
            prices: RwLock::new(Arc::new(prices)),
            links: RwLock::new(links),
            snapshot,
            reconcile_gate: Mutex::new(()),
        })
    }

    /// Open with a [`FileStore`] rooted at the configured data directory
    pub fn open_in_data_dir(config: RaffleConfig) -> RaffleResult<Self> {
        let store = FileStore::open(&config.data_dir).map_err(|e| {
            RaffleError::PersistenceFailure {
                key: "data_dir",
                reason: e.to_string(),
            }
        })?;
        Self::open(config, Arc::new(store))
    }

    pub fn config(&self) -> &RaffleConfig {
        &self.config
    }

    /// Dispatch a presentation-layer request
    pub async fn process(&self, instruction: RaffleInstruction) -> RaffleResult<RaffleOutcome> {
        match instruction {
            RaffleInstruction::StartRaffle {
                prize,
                prize_item_id,
                quantity,
                duration_days,
                origin_channel,
            } => {
                debug!("Instruction: Start Raffle");
                self.start_raffle(&prize, prize_item_id, quantity, duration_days, &origin_channel)
                    .await
                    .map(RaffleOutcome::Started)
            }
            RaffleInstruction::EnterRaffle {
                chat_id,
                ticket_count,
            } => {
                debug!("Instruction: Enter Raffle");
                self.enter_raffle_as(&chat_id, ticket_count)
                    .await
                    .map(RaffleOutcome::Entered)
            }
            RaffleInstruction::CloseRaffle {} => {
                debug!("Instruction: Close Raffle");
                self.close_raffle().await.map(RaffleOutcome::Closed)
            }
            RaffleInstruction::BalanceOf { chat_id } => {
                debug!("Instruction: Balance Of");
                self.balance_as(&chat_id).await.map(RaffleOutcome::Balance)
            }
            RaffleInstruction::TicketsInPool { chat_id } => {
                debug!("Instruction: Tickets In Pool");
                self.tickets_in_pool_as(&chat_id)
                    .await
                    .map(RaffleOutcome::PoolTickets)
            }
            RaffleInstruction::LinkAccount { chat_id, game_id } => {
                debug!("Instruction: Link Account");
                self.link_account(&chat_id, &game_id)
                    .await
                    .map(|previous| RaffleOutcome::Linked { previous })
            }
        }
    }

    // ---------------------------------------------------------------------
    // Wallet ledger
    // ---------------------------------------------------------------------

    /// Balance from the last persisted ledger
    pub fn balance_of(&self, participant: &str) -> u64 {
        self.snapshot.borrow().balance_of(participant)
    }

    /// Watermark from the last persisted ledger
    pub fn last_processed_timestamp(&self) -> UnixTimestamp {
        self.snapshot.borrow().last_processed_timestamp
    }

    pub async fn credit(&self, participant: &str, amount: u64) -> RaffleResult<u64> {
        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        let balance = next.credit(participant, amount)?;
        self.commit_ledger(&mut ledger, next)?;

        info!(participant, amount, balance, "wallet credited");
        Ok(balance)
    }

    pub async fn debit(&self, participant: &str, amount: u64) -> RaffleResult<u64> {
        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        let balance = next.debit(participant, amount)?;
        self.commit_ledger(&mut ledger, next)?;

        info!(participant, amount, balance, "wallet debited");
        Ok(balance)
    }

    /// Wipe every wallet to zero once `confirmation` resolves to `true`.
    ///
    /// Aborts without touching state if confirmation is refused or does not
    /// arrive within the configured timeout.
    pub async fn admin_reset_all_balances<C>(&self, confirmation: C) -> RaffleResult<usize>
    where
        C: Future<Output = bool> + Send,
    {
        self.await_confirmation(confirmation).await?;

        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        let wallets_cleared = next.reset_balances();
        self.commit_ledger(&mut ledger, next)?;

        warn!(wallets_cleared, "all wallet balances reset");
        Ok(wallets_cleared)
    }

    // ---------------------------------------------------------------------
    // Raffle pool
    // ---------------------------------------------------------------------

    pub async fn start_raffle(
        &self,
        prize: &str,
        prize_item_id: ItemId,
        quantity: u32,
        duration_days: u32,
        origin_channel: &str,
    ) -> RaffleResult<RafflePool> {
        self.start_raffle_at(
            prize,
            prize_item_id,
            quantity,
            duration_days,
            origin_channel,
            utils::now(),
        )
        .await
    }

    /// Open a raffle as of `now`
    pub async fn start_raffle_at(
        &self,
        prize: &str,
        prize_item_id: ItemId,
        quantity: u32,
        duration_days: u32,
        origin_channel: &str,
        now: UnixTimestamp,
    ) -> RaffleResult<RafflePool> {
        if quantity == 0 {
            return Err(RaffleError::InvalidAmount);
        }

        let mut guard = self.pool.lock().await;
        if guard.is_some() {
            return Err(RaffleError::RaffleAlreadyActive);
        }

        let pool = RafflePool::new(
            prize_display_label(prize, quantity),
            prize_item_id,
            Some(utils::closing_time(now, duration_days)),
            origin_channel.to_string(),
        );
        save_record(self.store.as_ref(), RAFFLE_KEY, &Some(pool.clone()))?;
        *guard = Some(pool.clone());

        info!(
            prize = %pool.prize_label,
            prize_item_id,
            closes_at = ?pool.closes_at,
            origin_channel,
            "raffle started"
        );
        Ok(pool)
    }

    /// Move `ticket_count` tickets from a wallet into the active pool.
    ///
    /// The debit and the allocation are applied together under both locks.
    /// The wallet is persisted first; if the pool then fails to persist, the
    /// debit is explicitly credited back before the error is returned.
    pub async fn enter_raffle(
        &self,
        participant: &str,
        ticket_count: u64,
    ) -> RaffleResult<EntryReceipt> {
        if ticket_count == 0 {
            return Err(RaffleError::InvalidAmount);
        }

        let mut ledger = self.ledger.lock().await;
        let mut pool_guard = self.pool.lock().await;
        let pool = pool_guard.as_ref().ok_or(RaffleError::NoActiveRaffle)?;

        let mut next_ledger = ledger.clone();
        let wallet_balance = next_ledger.debit(participant, ticket_count)?;
        let mut next_pool = pool.clone();
        let range = next_pool.allocate(participant, ticket_count)?;

        // Wallet first: a failure here leaves both records untouched
        self.commit_ledger(&mut ledger, next_ledger)?;

        if let Err(e) = save_record(self.store.as_ref(), RAFFLE_KEY, &Some(next_pool.clone())) {
            error!(participant, ticket_count, error = %e, "pool not saved, refunding debit");
            self.refund_debit(&mut ledger, participant, ticket_count);
            return Err(e);
        }

        let receipt = EntryReceipt {
            participant_id: participant.to_string(),
            held_in_pool: next_pool.tickets_held_by(participant),
            total_tickets: next_pool.total_tickets,
            range,
            wallet_balance,
        };
        *pool_guard = Some(next_pool);

        info!(
            participant,
            ticket_count,
            range_start = receipt.range.range_start,
            range_end = receipt.range.range_end,
            total_tickets = receipt.total_tickets,
            "raffle entered"
        );
        Ok(receipt)
    }

    /// Close the active raffle, draw a winner and discard the pool.
    ///
    /// An empty pool is discarded without a draw and reported as
    /// `NoTicketsSold`.
    pub async fn close_raffle(&self) -> RaffleResult<DrawResult> {
        let mut guard = self.pool.lock().await;
        match self.close_locked(&mut guard)? {
            CloseOutcome::Drawn(result) => Ok(result),
            CloseOutcome::NoTicketsSold { .. } => Err(RaffleError::NoTicketsSold),
        }
    }

    /// [`close_raffle`](Self::close_raffle) gated on an admin confirmation
    pub async fn close_raffle_confirmed<C>(&self, confirmation: C) -> RaffleResult<DrawResult>
    where
        C: Future<Output = bool> + Send,
    {
        self.await_confirmation(confirmation).await?;
        self.close_raffle().await
    }

    /// Close the raffle if its closing time has passed.
    ///
    /// Returns `None` when no raffle is due. Holding the pool lock across the
    /// check and the close keeps a concurrent manual close from drawing twice.
    pub async fn check_expiry(&self, now: UnixTimestamp) -> Option<RaffleResult<CloseOutcome>> {
        let mut guard = self.pool.lock().await;
        let due = guard.as_ref().is_some_and(|pool| pool.has_expired(now));
        if !due {
            return None;
        }
        info!(now, "raffle closing time reached");
        Some(self.close_locked(&mut guard))
    }

    /// Snapshot of the active raffle
    pub async fn active_raffle(&self) -> Option<RafflePool> {
        self.pool.lock().await.clone()
    }

    /// Tickets `participant` holds in the active pool, zero if none is open
    pub async fn tickets_in_pool(&self, participant: &str) -> u64 {
        self.pool
            .lock()
            .await
            .as_ref()
            .map(|pool| pool.tickets_held_by(participant))
            .unwrap_or(0)
    }

    // ---------------------------------------------------------------------
    // Identity links
    // ---------------------------------------------------------------------

    /// Link a chat identity to a game identity, returning the previous link
    pub async fn link_account(&self, chat_id: &str, game_id: &str) -> RaffleResult<Option<String>> {
        let mut links = self.links.write().await;
        let mut next = links.clone();
        let previous = next.link(chat_id, game_id);
        save_record(self.store.as_ref(), LINKS_KEY, &next)?;
        *links = next;

        info!(chat_id, game_id, "account linked");
        Ok(previous)
    }

    pub async fn game_identity(&self, chat_id: &str) -> RaffleResult<ParticipantId> {
        self.links.read().await.game_identity(chat_id).cloned()
    }

    pub async fn chat_identity_of(&self, game_id: &str) -> Option<String> {
        self.links
            .read()
            .await
            .chat_identity_of(game_id)
            .map(str::to_string)
    }

    pub async fn enter_raffle_as(&self, chat_id: &str, ticket_count: u64) -> RaffleResult<EntryReceipt> {
        if ticket_count == 0 {
            return Err(RaffleError::InvalidAmount);
        }
        let participant = self.game_identity(chat_id).await?;
        self.enter_raffle(&participant, ticket_count).await
    }

    pub async fn balance_as(&self, chat_id: &str) -> RaffleResult<u64> {
        let participant = self.game_identity(chat_id).await?;
        Ok(self.balance_of(&participant))
    }

    pub async fn tickets_in_pool_as(&self, chat_id: &str) -> RaffleResult<u64> {
        let participant = self.game_identity(chat_id).await?;
        Ok(self.tickets_in_pool(&participant).await)
    }

    // ---------------------------------------------------------------------
    // Price cache and donation reconciliation
    // ---------------------------------------------------------------------

    pub async fn unit_price(&self, item_id: ItemId) -> u64 {
        self.prices.read().await.unit_price(item_id)
    }

    /// Replace the price cache from `source`, returning the number of items.
    ///
    /// Items without a market value are priced at their buy price. The fetch runs before any lock is taken; on failure the stale cache
    /// stays in place.
    pub async fn refresh_prices<P: PriceSource>(&self, source: &P) -> RaffleResult<usize> {
        let fresh = PriceCache::from_listing(source.fetch_prices().await?);
        let count = fresh.len();

        let mut prices = self.prices.write().await;
        save_record(self.store.as_ref(), PRICES_KEY, &fresh)?;
        *prices = Arc::new(fresh);

        info!(items = count, "price cache refreshed");
        Ok(count)
    }

    /// Run one reconciliation pass against `source`.
    ///
    /// Only one pass runs at a time; a request made while another is in
    /// flight is skipped. The log fetch happens before the ledger lock is
    /// taken, and the ledger is persisted once for the whole batch.
    pub async fn reconcile_donations<L: LogSource>(&self, source: &L) -> RaffleResult<ReconcileReport> {
        let Ok(_gate) = self.reconcile_gate.try_lock() else {
            debug!("reconciliation already in flight, skipping");
            return Ok(ReconcileReport::Skipped);
        };

        let since = self.last_processed_timestamp();
        let events = source.fetch_since(since, self.config.log_fetch_limit).await?;
        if events.is_empty() {
            return Ok(ReconcileReport::Completed(ReconcileOutcome::default()));
        }

        let prices = self.prices.read().await.clone();
        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        let outcome = reconciler::reconcile(&mut next, events, &prices, &self.config);

        if outcome.ledger_dirty {
            self.commit_ledger(&mut ledger, next)?;
        }

        for deposit in &outcome.deposits {
            info!(
                sender = %deposit.sender_id,
                tickets = deposit.tickets,
                value = %utils::format_currency(deposit.total_value),
                balance = deposit.new_balance,
                "donation credited"
            );
        }
        debug!(
            processed = outcome.entries_processed,
            qualifying = outcome.qualifying_entries,
            watermark = ledger.last_processed_timestamp,
            "reconciliation pass complete"
        );
        Ok(ReconcileReport::Completed(outcome))
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Persist `next` and make it the live ledger
    fn commit_ledger(&self, ledger: &mut WalletLedger, next: WalletLedger) -> RaffleResult<()> {
        save_record(self.store.as_ref(), WALLET_KEY, &next)?;
        *ledger = next;
        self.snapshot.send_replace(Arc::new(ledger.clone()));
        Ok(())
    }

    /// Compensate a persisted debit whose pool allocation could not be saved
    fn refund_debit(&self, ledger: &mut WalletLedger, participant: &str, amount: u64) {
        let mut refunded = ledger.clone();
        let refund = refunded
            .credit(participant, amount)
            .and_then(|_| self.commit_ledger(ledger, refunded));

        if let Err(e) = refund {
            error!(participant, amount, error = %e, "refund failed, reloading wallet from store");
            match load_record::<WalletLedger>(self.store.as_ref(), WALLET_KEY) {
                Ok(stored) => {
                    *ledger = stored.unwrap_or_default();
                    self.snapshot.send_replace(Arc::new(ledger.clone()));
                }
                Err(e) => error!(error = %e, "wallet reload failed, keeping last committed ledger"),
            }
        }
    }

    fn close_locked(&self, guard: &mut Option<RafflePool>) -> RaffleResult<CloseOutcome> {
        let pool = guard.as_ref().ok_or(RaffleError::NoActiveRaffle)?;

        let outcome = match draw::draw_winner(pool, &mut rand::thread_rng()) {
            Ok(result) => CloseOutcome::Drawn(result),
            Err(RaffleError::NoTicketsSold) => CloseOutcome::NoTicketsSold {
                prize_label: pool.prize_label.clone(),
                origin_channel: pool.origin_channel.clone(),
            },
            Err(e) => return Err(e),
        };

        // The pool is only discarded in memory once the store agrees
        save_record::<Option<RafflePool>>(self.store.as_ref(), RAFFLE_KEY, &None)?;
        *guard = None;

        match &outcome {
            CloseOutcome::Drawn(result) => info!(
                prize = %result.prize_label,
                winner = %result.winner_id,
                winning_ticket = result.winning_ticket,
                total_tickets = result.total_tickets,
                chance = %utils::format_percent(result.winner_share()),
                "raffle closed"
            ),
            CloseOutcome::NoTicketsSold { prize_label, .. } => {
                info!(prize = %prize_label, "raffle closed with no tickets sold")
            }
        }
        Ok(outcome)
    }

    async fn await_confirmation<C>(&self, confirmation: C) -> RaffleResult<()>
    where
        C: Future<Output = bool> + Send,
    {
        match tokio::time::timeout(self.config.confirmation_timeout(), confirmation).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                info!("admin confirmation declined");
                Err(RaffleError::ConfirmationDeclined)
            }
            Err(_) => {
                info!("admin confirmation timed out");
                Err(RaffleError::ConfirmationTimeout)
            }
        }
    }
}
