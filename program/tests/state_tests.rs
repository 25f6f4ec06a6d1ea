use donation_raffle::{
    state::{
        prize_display_label, ItemListing, LinkTable, PriceCache, RafflePool, TicketRange,
        WalletLedger,
    },
    RaffleError,
};

fn open_pool() -> RafflePool {
    RafflePool::new("Xanax".to_string(), 206, None, "channel-1".to_string())
}

#[test]
fn test_balance_tracks_credits_minus_successful_debits() {
    let mut ledger = WalletLedger::default();
    let ops: [(bool, u64); 8] = [
        (true, 5),
        (false, 3),
        (false, 4), // rejected, only 2 left
        (true, 10),
        (false, 12),
        (false, 1), // rejected, empty
        (true, 1),
        (false, 1),
    ];

    let mut expected: u64 = 0;
    for (is_credit, amount) in ops {
        if is_credit {
            ledger.credit("alice", amount).unwrap();
            expected += amount;
        } else if ledger.debit("alice", amount).is_ok() {
            expected -= amount;
        }
        assert_eq!(ledger.balance_of("alice"), expected);
    }
    assert_eq!(expected, 0);
}

#[test]
fn test_debit_rejected_without_mutation() {
    let mut ledger = WalletLedger::default();
    ledger.credit("alice", 3).unwrap();
    let before = ledger.clone();

    match ledger.debit("alice", 4) {
        Err(RaffleError::InsufficientBalance {
            available,
            requested,
        }) => {
            assert_eq!(available, 3);
            assert_eq!(requested, 4);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(ledger, before);
}

#[test]
fn test_zero_amounts_rejected() {
    let mut ledger = WalletLedger::default();
    assert!(matches!(ledger.credit("a", 0), Err(RaffleError::InvalidAmount)));
    assert!(matches!(ledger.debit("a", 0), Err(RaffleError::InvalidAmount)));
    assert_eq!(ledger.balance_of("a"), 0);
}

#[test]
fn test_watermark_never_moves_back() {
    let mut ledger = WalletLedger::default();
    assert!(ledger.advance_watermark(100));
    assert!(!ledger.advance_watermark(50));
    assert!(!ledger.advance_watermark(100));
    assert_eq!(ledger.last_processed_timestamp, 100);
}

#[test]
fn test_reset_keeps_watermark() {
    let mut ledger = WalletLedger::default();
    ledger.credit("a", 1).unwrap();
    ledger.credit("b", 2).unwrap();
    ledger.advance_watermark(42);

    assert_eq!(ledger.reset_balances(), 2);
    assert_eq!(ledger.balance_of("a"), 0);
    assert_eq!(ledger.last_processed_timestamp, 42);
}

#[test]
fn test_allocations_partition_ticket_space() {
    let mut pool = open_pool();
    let requests = [("a", 10), ("b", 90), ("a", 1), ("c", 7)];

    for (participant, count) in requests {
        let range = pool.allocate(participant, count).unwrap();
        assert_eq!(range.range_end, pool.total_tickets);
        assert_eq!(range.ticket_count(), count);
        assert!(pool.is_consistent());
    }

    let sum: u64 = pool.entries.iter().map(TicketRange::ticket_count).sum();
    assert_eq!(pool.total_tickets, 108);
    assert_eq!(sum, pool.total_tickets);
    assert_eq!(pool.entries[1].range_start, 11);
    assert_eq!(pool.entries[2].range_start, 101);
}

#[test]
fn test_zero_allocation_rejected() {
    let mut pool = open_pool();
    assert!(matches!(pool.allocate("a", 0), Err(RaffleError::InvalidAmount)));
    assert!(pool.entries.is_empty());
    assert_eq!(pool.total_tickets, 0);
}

#[test]
fn test_every_ticket_has_exactly_one_owner() {
    let mut pool = open_pool();
    pool.allocate("a", 3).unwrap();
    pool.allocate("b", 1).unwrap();
    pool.allocate("c", 5).unwrap();

    for ticket in 1..=pool.total_tickets {
        let owners = pool.entries.iter().filter(|e| e.contains(ticket)).count();
        assert_eq!(owners, 1, "ticket {}", ticket);
        assert!(pool.owner_of(ticket).unwrap().contains(ticket));
    }
    assert_eq!(pool.owner_of(4).unwrap().participant_id, "b");
    assert!(pool.owner_of(0).is_none());
    assert!(pool.owner_of(pool.total_tickets + 1).is_none());
}

#[test]
fn test_tickets_held_sums_all_entries() {
    let mut pool = open_pool();
    pool.allocate("a", 3).unwrap();
    pool.allocate("b", 2).unwrap();
    pool.allocate("a", 4).unwrap();

    assert_eq!(pool.tickets_held_by("a"), 7);
    assert_eq!(pool.tickets_held_by("b"), 2);
    assert_eq!(pool.tickets_held_by("nobody"), 0);
}

#[test]
fn test_inconsistent_pool_detected() {
    let mut pool = open_pool();
    pool.allocate("a", 3).unwrap();
    pool.entries.push(TicketRange {
        participant_id: "b".to_string(),
        range_start: 5,
        range_end: 6,
    });
    pool.total_tickets = 6;
    assert!(!pool.is_consistent());
}

#[test]
fn test_expiry() {
    let mut pool = open_pool();
    assert!(!pool.has_expired(i64::MAX));

    pool.closes_at = Some(1_000);
    assert!(!pool.has_expired(999));
    assert!(pool.has_expired(1_000));
    assert!(pool.has_expired(1_001));
}

#[test]
fn test_prize_label() {
    assert_eq!(prize_display_label("Xanax", 1), "Xanax");
    assert_eq!(prize_display_label("Xanax", 5), "5x Xanax");
}

#[test]
fn test_price_listing_falls_back_to_buy_price() {
    let cache = PriceCache::from_listing(vec![
        ItemListing {
            item_id: 1,
            market_value: 900,
            buy_price: 100,
        },
        ItemListing {
            item_id: 2,
            market_value: 0,
            buy_price: 250,
        },
    ]);
    assert_eq!(cache.unit_price(1), 900);
    assert_eq!(cache.unit_price(2), 250);
    assert_eq!(cache.unit_price(3), 0);
}

#[test]
fn test_link_table_lookups() {
    let mut links = LinkTable::default();
    assert!(matches!(links.game_identity("d1"), Err(RaffleError::NotLinked)));

    assert_eq!(links.link("d1", "1001"), None);
    assert_eq!(links.link("d1", "1002"), Some("1001".to_string()));
    assert_eq!(links.game_identity("d1").unwrap(), "1002");
    assert_eq!(links.chat_identity_of("1002"), Some("d1"));
    assert_eq!(links.chat_identity_of("1001"), None);
}
