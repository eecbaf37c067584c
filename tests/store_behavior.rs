//! Behaviour tests for the ingest and read paths: shard routing, fan-out
//! reads, relaxed-ingest filtering, and symbol metadata upserts.

use time::Month;

use tickvault_core::{Symbol, BIN_WIDTH};
use tickvault_tests::{at, date, tick, StoreFixture};

// =============================================================================
// Routing and fan-out reads
// =============================================================================

#[test]
fn when_ticks_span_two_years_they_land_in_two_shards() {
    let store = StoreFixture::open();

    let batch = vec![
        tick("BTC", date(2021, Month::June, 1), 35_000.0),
        tick("BTC", date(2022, Month::June, 1), 30_000.0),
    ];
    store.writer.write_ticks(&batch).expect("ingest");

    let shards = store.catalog.shards().expect("shards");
    assert_eq!(shards.len(), 2, "one shard per 365-day bin");

    let window = store
        .reader
        .read(
            "BTC",
            Some(date(2021, Month::January, 1)),
            Some(date(2021, Month::December, 31)),
            None,
            true,
        )
        .expect("read");
    assert_eq!(window.len(), 1, "only the 2021 tick is inside the window");
    assert_eq!(window[0].event_at, date(2021, Month::June, 1));
    assert_eq!(window[0].current_value, 35_000.0);
}

#[test]
fn when_reading_ascending_and_descending_the_order_flips() {
    let store = StoreFixture::open();

    let batch = vec![
        tick("ETH", at(100), 1.0),
        tick("ETH", at(300), 3.0),
        tick("ETH", at(200), 2.0),
    ];
    store.writer.write_ticks(&batch).expect("ingest");

    let ascending = store
        .reader
        .read("ETH", Some(at(0)), Some(at(1_000)), None, true)
        .expect("read");
    let times: Vec<i64> = ascending.iter().map(|t| t.event_at.unix_timestamp()).collect();
    assert_eq!(times, [100, 200, 300]);

    let descending = store
        .reader
        .read("ETH", Some(at(0)), Some(at(1_000)), None, false)
        .expect("read");
    let times: Vec<i64> = descending.iter().map(|t| t.event_at.unix_timestamp()).collect();
    assert_eq!(times, [300, 200, 100]);
}

#[test]
fn when_a_limit_is_set_the_rows_closest_to_the_boundary_win() {
    let store = StoreFixture::open();

    let batch: Vec<_> = (1..=5i64)
        .map(|i| tick("ETH", at(i * 100), i as f64))
        .collect();
    store.writer.write_ticks(&batch).expect("ingest");

    let first = store
        .reader
        .read_first("ETH", Some(at(0)), Some(at(1_000)))
        .expect("read_first")
        .expect("present");
    assert_eq!(first.event_at, at(100));

    let last = store
        .reader
        .read_last("ETH", Some(at(0)), Some(at(1_000)))
        .expect("read_last")
        .expect("present");
    assert_eq!(last.event_at, at(500));

    let top2 = store
        .reader
        .read("ETH", Some(at(0)), Some(at(1_000)), Some(2), false)
        .expect("read");
    let times: Vec<i64> = top2.iter().map(|t| t.event_at.unix_timestamp()).collect();
    assert_eq!(times, [500, 400]);
}

#[test]
fn when_a_label_has_no_shards_reads_return_empty_not_error() {
    let store = StoreFixture::open();
    let ticks = store.reader.read_all("MISSING").expect("read");
    assert!(ticks.is_empty());
    assert!(store
        .reader
        .read_first("MISSING", None, None)
        .expect("read_first")
        .is_none());
}

#[test]
fn when_a_window_sits_strictly_inside_one_shard_nothing_is_selected() {
    // The shard-selection predicate matches on shard boundaries only; a
    // window fully inside a single bin selects no shard. Long-standing
    // behaviour, asserted here so a change to it is a deliberate one.
    let store = StoreFixture::open();

    let bin = BIN_WIDTH.whole_seconds();
    store
        .writer
        .write_ticks(&[tick("BTC", at(bin + 1_000), 1.0)])
        .expect("ingest");

    let inside = store
        .reader
        .read("BTC", Some(at(bin + 500)), Some(at(bin + 2_000)), None, true)
        .expect("read");
    assert!(inside.is_empty());

    let spanning = store
        .reader
        .read("BTC", Some(at(bin - 10)), Some(at(bin + 2_000)), None, true)
        .expect("read");
    assert_eq!(spanning.len(), 1);
}

// =============================================================================
// Relaxed-ingest filtering
// =============================================================================

#[test]
fn when_a_tick_code_starts_with_a_digit_it_is_silently_dropped() {
    let store = StoreFixture::open();

    store
        .writer
        .write_ticks(&[tick("3X", at(100), 1.0)])
        .expect("ingest succeeds despite the drop");

    assert!(store.reader.read_all("3X").expect("read").is_empty());
    assert!(store.catalog.shards().expect("shards").is_empty());
}

#[test]
fn when_the_same_batch_is_written_twice_rows_are_not_duplicated() {
    let store = StoreFixture::open();

    let batch = vec![tick("BTC", at(100), 1.0), tick("BTC", at(200), 2.0)];
    store.writer.write_ticks(&batch).expect("first write");
    store.writer.write_ticks(&batch).expect("second write");
    store.maintenance.remove_duplicates().expect("dedup");

    let ticks = store
        .reader
        .read("BTC", Some(at(0)), Some(at(1_000)), None, true)
        .expect("read");
    assert_eq!(ticks.len(), 2);
}

#[test]
fn when_shards_are_written_in_parallel_all_rows_arrive() {
    let store = StoreFixture::open();

    let bin = BIN_WIDTH.whole_seconds();
    let batch: Vec<_> = (0..4i64)
        .flat_map(|year| {
            let code = if year % 2 == 0 { "BTC" } else { "ETH" };
            vec![
                tick(code, at(year * bin + 100), 1.0),
                tick(code, at(year * bin + 200), 2.0),
            ]
        })
        .collect();

    store.writer.write_ticks_parallel(&batch).expect("ingest");

    assert_eq!(store.catalog.shards().expect("shards").len(), 4);
    assert_eq!(store.reader.read_all("BTC").expect("read").len(), 4);
    assert_eq!(store.reader.read_all("ETH").expect("read").len(), 4);
}

#[test]
fn when_one_shard_fails_in_parallel_sibling_rows_still_arrive() {
    let store = StoreFixture::open();

    let bin = BIN_WIDTH.whole_seconds();
    store.fail_inserts_into("eth__");
    let batch = vec![
        tick("BTC", at(100), 1.0),
        tick("BTC", at(bin + 100), 2.0),
        tick("ETH", at(100), 3.0),
    ];

    store
        .writer
        .write_ticks_parallel(&batch)
        .expect("a failing shard must not fail the batch");

    assert_eq!(store.reader.read_all("BTC").expect("read").len(), 2);
    assert!(store.reader.read_all("ETH").expect("read").is_empty());
}

// =============================================================================
// Symbol metadata
// =============================================================================

#[test]
fn when_the_first_symbol_arrives_the_metadata_relation_is_created() {
    let store = StoreFixture::open();

    let mut symbol = Symbol::new("BTC", "Bitcoin");
    symbol.currency = Some("USD".to_owned());
    store.writer.write_symbol(&symbol).expect("write");

    let listed = store.backend.list_relations("symbols").expect("list");
    assert_eq!(listed, vec![String::from("symbols")]);
}

#[test]
fn when_a_symbol_is_unchanged_no_update_statement_is_issued() {
    let store = StoreFixture::open();

    let symbol = Symbol::new("BTC", "Bitcoin");
    store.writer.write_symbol(&symbol).expect("first write");
    store.drain_statements();

    store.writer.write_symbol(&symbol).expect("second write");
    let statements = store.drain_statements();
    assert!(
        !statements.iter().any(|sql| sql.starts_with("UPDATE")),
        "empty diff must not issue an UPDATE, got: {statements:?}"
    );
}

#[test]
fn when_a_symbol_field_changes_only_that_field_is_updated() {
    let store = StoreFixture::open();

    let symbol = Symbol::new("BTC", "Bitcoin");
    store.writer.write_symbol(&symbol).expect("first write");

    let mut renamed = symbol.clone();
    renamed.full_name = "Bitcoin Core".to_owned();
    store.drain_statements();
    store.writer.write_symbol(&renamed).expect("update");

    let statements = store.drain_statements();
    let update = statements
        .iter()
        .find(|sql| sql.starts_with("UPDATE"))
        .expect("one UPDATE issued");
    assert!(update.contains("full_name = 'Bitcoin Core'"));
    assert!(!update.contains("currency"));
}

#[test]
fn when_symbol_and_ticks_are_written_together_both_are_visible() {
    let store = StoreFixture::open();

    let mut symbol = Symbol::new("BTC", "Bitcoin");
    symbol.category = Some("crypto".to_owned());
    store
        .writer
        .write(&symbol, &[tick("BTC", at(100), 1.0)])
        .expect("write");

    assert_eq!(store.reader.read_all("BTC").expect("read").len(), 1);
    let rows = store
        .backend
        .execute("SELECT full_name, category FROM symbols WHERE short_code = 'BTC'")
        .expect("query");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("full_name").and_then(|v| v.as_str()),
        Some("Bitcoin")
    );
}

// =============================================================================
// Read cache
// =============================================================================

#[test]
fn when_the_writer_touches_a_label_cached_reads_are_invalidated() {
    let store = StoreFixture::open();

    store
        .writer
        .write_ticks(&[tick("BTC", at(100), 1.0)])
        .expect("ingest");

    // Prime the cache.
    let first = store
        .reader
        .read("BTC", Some(at(0)), Some(at(1_000)), None, true)
        .expect("read");
    assert_eq!(first.len(), 1);
    assert!(!store.cache.is_empty());

    store
        .writer
        .write_ticks(&[tick("BTC", at(200), 2.0)])
        .expect("ingest");

    let second = store
        .reader
        .read("BTC", Some(at(0)), Some(at(1_000)), None, true)
        .expect("read");
    assert_eq!(second.len(), 2, "cache must not serve the stale result");
}

#[test]
fn when_a_batch_fails_midway_cached_reads_for_its_labels_are_still_dropped() {
    // A batch spanning two bins can land rows in the first shard and then
    // fail in the second; the cached results for every routed label must go,
    // or reads keep returning the pre-write state.
    let store = StoreFixture::open();

    store
        .writer
        .write_ticks(&[tick("BTC", at(100), 1.0)])
        .expect("ingest");
    let primed = store
        .reader
        .read("BTC", Some(at(0)), Some(at(1_000)), None, true)
        .expect("read");
    assert_eq!(primed.len(), 1);
    assert!(!store.cache.is_empty());

    let bin = BIN_WIDTH.whole_seconds();
    store.fail_inserts_into(&format!("btc__{bin}"));
    let outcome = store.writer.write_ticks(&[
        tick("BTC", at(200), 2.0),
        tick("BTC", at(bin + 100), 3.0),
    ]);
    assert!(outcome.is_err(), "the second bin's shard rejects inserts");
    assert!(
        store.cache.is_empty(),
        "stale results must not outlive a partially landed batch"
    );

    store.restore_inserts();
    let fresh = store
        .reader
        .read("BTC", Some(at(0)), Some(at(1_000)), None, true)
        .expect("read");
    assert!(
        fresh.iter().any(|t| t.event_at == at(100)),
        "reads after the failure reflect what is actually stored"
    );
}
