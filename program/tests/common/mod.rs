#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use donation_raffle::{
    source::{EventSink, LogSource, PriceSource},
    state::{DonatedItem, DonationEvent, ItemListing, PriceCache, UnixTimestamp},
    store::RecordStore,
    RaffleConfig, RaffleEvent, RaffleManager, SourceError,
};

pub const DONATION_KIND: u32 = 4103;

/// In-memory record store whose writes can be made to fail per key
#[derive(Default)]
pub struct FlakyStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    /// Writes still allowed per key before it starts failing
    budgets: Mutex<HashMap<String, usize>>,
}

impl FlakyStore {
    pub fn fail_writes_to(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    /// Let `allowed` more writes to `key` succeed, then fail the rest
    pub fn fail_writes_to_after(&self, key: &str, allowed: usize) {
        self.budgets.lock().unwrap().insert(key.to_string(), allowed);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.budgets.lock().unwrap().clear();
    }
}

impl RecordStore for FlakyStore {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        if let Some(allowed) = self.budgets.lock().unwrap().get_mut(key) {
            if *allowed == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            *allowed -= 1;
        }
        self.records
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

pub struct StaticPrices(pub Vec<ItemListing>);

impl PriceSource for StaticPrices {
    fn fetch_prices(&self) -> impl Future<Output = Result<Vec<ItemListing>, SourceError>> + Send {
        let listing = self.0.clone();
        async move { Ok(listing) }
    }
}

pub struct UnreachablePrices;

impl PriceSource for UnreachablePrices {
    fn fetch_prices(&self) -> impl Future<Output = Result<Vec<ItemListing>, SourceError>> + Send {
        async { Err(SourceError::Request("connection refused".to_string())) }
    }
}

/// Log source that returns every entry it holds, ignoring the timestamp,
/// so the reconciler's own filtering is exercised.
#[derive(Default)]
pub struct ScriptedLog {
    pub entries: Mutex<Vec<DonationEvent>>,
    pub fail: Mutex<bool>,
}

impl ScriptedLog {
    pub fn with(entries: Vec<DonationEvent>) -> Self {
        Self {
            entries: Mutex::new(entries),
            fail: Mutex::new(false),
        }
    }

    pub fn push(&self, event: DonationEvent) {
        self.entries.lock().unwrap().push(event);
    }
}

impl LogSource for ScriptedLog {
    fn fetch_since(
        &self,
        _since: UnixTimestamp,
        _limit: usize,
    ) -> impl Future<Output = Result<Vec<DonationEvent>, SourceError>> + Send {
        let result = if *self.fail.lock().unwrap() {
            Err(SourceError::Api {
                code: 5,
                message: "Too many requests".to_string(),
            })
        } else {
            Ok(self.entries.lock().unwrap().clone())
        };
        async move { result }
    }
}

/// Log source that takes `delay` to answer
pub struct SlowLog {
    pub log: ScriptedLog,
    pub delay: Duration,
}

impl LogSource for SlowLog {
    fn fetch_since(
        &self,
        since: UnixTimestamp,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<DonationEvent>, SourceError>> + Send {
        let fetch = self.log.fetch_since(since, limit);
        let delay = self.delay;
        async move {
            tokio::time::sleep(delay).await;
            fetch.await
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<RaffleEvent>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<RaffleEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: RaffleEvent) -> impl Future<Output = ()> + Send {
        self.events.lock().unwrap().push(event);
        async {}
    }
}

pub fn donation(timestamp: UnixTimestamp, sender: &str, items: &[(u64, u64)]) -> DonationEvent {
    DonationEvent {
        timestamp,
        sender_id: sender.to_string(),
        log_kind: DONATION_KIND,
        message: "LLF raffle".to_string(),
        items: items
            .iter()
            .map(|&(item_id, quantity)| DonatedItem { item_id, quantity })
            .collect(),
    }
}

pub fn prices(entries: &[(u64, u64)]) -> PriceCache {
    PriceCache {
        prices: entries.iter().copied().collect(),
    }
}

/// Listing where every item has a market value of `price`
pub fn listing(entries: &[(u64, u64)]) -> Vec<ItemListing> {
    entries
        .iter()
        .map(|&(item_id, price)| ItemListing {
            item_id,
            market_value: price,
            buy_price: price,
        })
        .collect()
}

// Setup a manager over an in-memory store
pub fn setup() -> (Arc<RaffleManager>, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::default());
    let manager = RaffleManager::open(RaffleConfig::default(), store.clone()).unwrap();
    (Arc::new(manager), store)
}
