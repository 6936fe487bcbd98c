//! End-to-end caching through `Pipeline` on in-memory storage.
//!
//! Covers:
//! 1. Two-feed priority fill (EURCAD)
//! 2. monounique absorbed with {report}, escalated with {raise}
//! 3. Idempotent re-cache
//! 4. fnum assignment across deletes
//! 5. Override latest-wins and failsafe fallback
//! 6. Munge step order
//! 7. Validity after cache and on demand

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;

use symcache_core::domain::{
    kwargs, FeedDraft, FeedState, IndexValue, Kwargs, MungeStep, OrfDraft, Series, SourceSpec,
};
use symcache_core::handling::{
    BitPolicy, FeedCheckpoint, FeedHandle, Flag, HandleDefaults, SymbolCheckpoint,
};
use symcache_core::source::{SourceRegistry, StaticSource};
use symcache_core::{
    CacheState, MemoryStorage, Pipeline, PipelineError, Registries, Settings, Storage,
    StorageError, SymbolManager,
};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn at(day: u32, hour: u32) -> NaiveDateTime {
    d(2020, 1, day).and_hms_opt(hour, 0, 0).unwrap()
}

struct Harness {
    storage: Arc<dyn Storage>,
    manager: SymbolManager,
    pipeline: Pipeline,
}

fn harness(source: StaticSource) -> Harness {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let registries = Registries::builtin()
        .with_sources(SourceRegistry::new().with(Arc::new(source)))
        .shared();
    let manager = SymbolManager::new(
        storage.clone(),
        registries.clone(),
        HandleDefaults::default(),
    );
    let pipeline = Pipeline::new(storage.clone(), registries, Settings::default());
    Harness {
        storage,
        manager,
        pipeline,
    }
}

fn static_feed(key: &str) -> FeedDraft {
    FeedDraft::new(SourceSpec::new("static").param("key", key))
}

fn eurcad_source() -> StaticSource {
    StaticSource::new("static")
        .with(
            "a",
            Series::from_pairs("a", [(d(2020, 1, 1), Some(1.30)), (d(2020, 1, 2), None)]),
        )
        .with(
            "b",
            Series::from_pairs(
                "b",
                [(d(2020, 1, 1), Some(1.31)), (d(2020, 1, 2), Some(1.32))],
            ),
        )
}

fn eurcad(h: &Harness) {
    h.manager
        .create(h.manager.blank("EURCAD"), false)
        .unwrap();
    h.manager.add_feed("EURCAD", static_feed("a")).unwrap();
    h.manager.add_feed("EURCAD", static_feed("b")).unwrap();
}

fn final_values(h: &Harness, name: &str) -> Vec<(IndexValue, Option<f64>)> {
    h.manager
        .final_series(name)
        .unwrap()
        .points
        .into_iter()
        .map(|p| (p.index, p.value))
        .collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn eurcad_two_feed_priority_fill() {
    let h = harness(eurcad_source());
    eurcad(&h);

    let report = h.pipeline.cache("EURCAD", true).unwrap();
    assert_eq!(report.reached, CacheState::Done);
    assert_eq!(report.rows, 2);
    assert_eq!(report.valid, Some(true));
    assert!(report.is_clean(), "{}", report.summary());

    assert_eq!(
        final_values(&h, "EURCAD"),
        vec![
            (IndexValue::Date(d(2020, 1, 1)), Some(1.30)),
            (IndexValue::Date(d(2020, 1, 2)), Some(1.32)),
        ]
    );
    let table = h.manager.raw_data("EURCAD").unwrap();
    assert_eq!(
        table.column_names(),
        vec!["indx", "final", "override_feed000", "feed001", "feed002", "failsafe_feed999"]
    );
}

#[test]
fn each_feed_reports_sourcing_and_tail() {
    let h = harness(eurcad_source());
    eurcad(&h);
    let report = h.pipeline.cache("EURCAD", false).unwrap();
    assert_eq!(report.feeds.len(), 2);
    assert_eq!(report.points_at("readmeta").count(), 2);
    // one finish point per feed plus the symbol's own
    assert_eq!(report.points_at("finish").count(), 3);
    assert_eq!(report.valid, None);
}

#[test]
fn monounique_reported_when_absorbed() {
    let source = StaticSource::new("static").with(
        "dup",
        Series::from_pairs("dup", [(d(2020, 1, 1), Some(1.0)), (d(2020, 1, 1), Some(2.0))]),
    );
    let h = harness(source);
    h.manager.create(h.manager.blank("DUP"), false).unwrap();
    let mut handle = FeedHandle::default();
    handle.monounique = BitPolicy::from_flags([Flag::Report]);
    h.manager
        .add_feed("DUP", static_feed("dup").handle(handle))
        .unwrap();

    let report = h.pipeline.cache("DUP", false).unwrap();
    assert_eq!(report.reached, CacheState::Done);
    assert!(report.has_handle(FeedCheckpoint::Monounique));
    assert!(!report.is_clean());
    // the first of the duplicated rows is kept
    assert_eq!(
        final_values(&h, "DUP"),
        vec![(IndexValue::Date(d(2020, 1, 1)), Some(1.0))]
    );
}

#[test]
fn monounique_escalates_and_writes_nothing() {
    let source = StaticSource::new("static").with(
        "dup",
        Series::from_pairs("dup", [(d(2020, 1, 2), Some(1.0)), (d(2020, 1, 1), Some(2.0))]),
    );
    let h = harness(source);
    h.manager.create(h.manager.blank("DUP"), false).unwrap();
    h.manager.add_feed("DUP", static_feed("dup")).unwrap();

    let err = h.pipeline.cache("DUP", false).unwrap_err();
    assert_eq!(err.checkpoint(), Some(FeedCheckpoint::Monounique.into()));
    assert!(h.storage.read_final_table("DUP").unwrap().is_none());
    assert!(matches!(
        h.manager.final_series("DUP"),
        Err(PipelineError::Storage(StorageError::NoTable(_)))
    ));
}

#[test]
fn symbol_without_feeds_cannot_be_cached() {
    let h = harness(StaticSource::new("static"));
    let permissive = h
        .manager
        .blank("EMPTY")
        .with_handle(symcache_core::handling::SymbolHandle::uniform(BitPolicy::SILENT));
    h.manager.create(permissive, false).unwrap();
    assert!(matches!(
        h.pipeline.cache("EMPTY", true),
        Err(PipelineError::NoFeeds(_))
    ));
}

#[test]
fn recache_is_bit_identical() {
    let h = harness(eurcad_source());
    eurcad(&h);
    let first = h.pipeline.cache("EURCAD", true).unwrap();
    let stored_first = h.storage.read_final_table("EURCAD").unwrap();
    let second = h.pipeline.cache("EURCAD", true).unwrap();
    let stored_second = h.storage.read_final_table("EURCAD").unwrap();

    assert!(first.table_hash.is_some());
    assert_eq!(first.table_hash, second.table_hash);
    assert_eq!(stored_first, stored_second);
    assert!(second.points_at("persist").next().is_none());
}

#[test]
fn fnums_are_assigned_monotonically() {
    let h = harness(eurcad_source());
    h.manager.create(h.manager.blank("F"), false).unwrap();
    let fnums: Vec<u32> = (0..3)
        .map(|_| h.manager.add_feed("F", static_feed("a")).unwrap().fnum)
        .collect();
    assert_eq!(fnums, vec![0, 1, 2]);

    h.manager.delete_feed("F", 1).unwrap();
    assert_eq!(h.manager.add_feed("F", static_feed("b")).unwrap().fnum, 3);

    h.pipeline.cache("F", false).unwrap();
    let names = h.manager.raw_data("F").unwrap().column_names();
    assert_eq!(
        names,
        vec!["indx", "final", "override_feed000", "feed001", "feed003", "feed004", "failsafe_feed999"]
    );
}

#[test]
fn feed_count_change_recreates_schema() {
    let h = harness(eurcad_source());
    eurcad(&h);
    h.pipeline.cache("EURCAD", false).unwrap();
    h.manager.add_feed("EURCAD", static_feed("b")).unwrap();
    let report = h.pipeline.cache("EURCAD", false).unwrap();
    assert_eq!(report.points_at("persist").count(), 1);
    assert_eq!(h.manager.raw_data("EURCAD").unwrap().feed_columns().count(), 3);
}

#[test]
fn off_feeds_are_skipped() {
    let h = harness(eurcad_source());
    eurcad(&h);
    h.manager.set_feed_state("EURCAD", 0, FeedState::Off).unwrap();
    h.pipeline.cache("EURCAD", false).unwrap();
    let values: Vec<Option<f64>> = final_values(&h, "EURCAD").into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![Some(1.31), Some(1.32)]);
}

#[test]
fn latest_override_wins_regardless_of_append_order() {
    let h = harness(eurcad_source());
    eurcad(&h);
    let day2 = d(2020, 1, 2);
    h.manager
        .add_override("EURCAD", OrfDraft::new(day2, 9.0).at(at(3, 10)))
        .unwrap();
    // appended later but logged earlier
    h.manager
        .add_override("EURCAD", OrfDraft::new(day2, 8.0).at(at(3, 9)))
        .unwrap();
    h.pipeline.cache("EURCAD", false).unwrap();
    assert_eq!(final_values(&h, "EURCAD")[1].1, Some(9.0));

    // same timestamp: the higher sequence number wins
    h.manager
        .add_override("EURCAD", OrfDraft::new(day2, 7.0).at(at(3, 10)))
        .unwrap();
    h.pipeline.cache("EURCAD", false).unwrap();
    assert_eq!(final_values(&h, "EURCAD")[1].1, Some(7.0));
}

#[test]
fn failsafe_fills_only_when_everything_else_is_missing() {
    let h = harness(eurcad_source());
    eurcad(&h);
    let day1 = d(2020, 1, 1);
    let day9 = d(2020, 1, 9);
    h.manager
        .add_failsafe("EURCAD", OrfDraft::new(day1, 0.0).by("ops"))
        .unwrap();
    h.manager
        .add_failsafe("EURCAD", OrfDraft::new(day9, 1.5).comment("holiday"))
        .unwrap();
    h.pipeline.cache("EURCAD", false).unwrap();
    assert_eq!(
        final_values(&h, "EURCAD"),
        vec![
            (IndexValue::Date(day1), Some(1.30)),
            (IndexValue::Date(d(2020, 1, 2)), Some(1.32)),
            (IndexValue::Date(day9), Some(1.5)),
        ]
    );
}

#[test]
fn munge_steps_apply_in_order() {
    let sparse = Series::from_pairs(
        "m",
        [(d(2020, 1, 15), Some(1.0)), (d(2020, 3, 15), Some(3.0))],
    );
    let h = harness(StaticSource::new("static").with("m", sparse));
    let resample = || MungeStep::method("resample", kwargs([("rule", "M")]));
    let ffill = || MungeStep::method("ffill", Kwargs::new());

    h.manager.create(h.manager.blank("AB"), false).unwrap();
    h.manager
        .add_feed("AB", static_feed("m").munge(resample()).munge(ffill()))
        .unwrap();
    h.manager.create(h.manager.blank("BA"), false).unwrap();
    h.manager
        .add_feed("BA", static_feed("m").munge(ffill()).munge(resample()))
        .unwrap();

    h.pipeline.cache("AB", false).unwrap();
    h.pipeline.cache("BA", false).unwrap();
    let ab = final_values(&h, "AB");
    let ba = final_values(&h, "BA");
    assert_ne!(ab, ba);
    assert_eq!(ab[1], (IndexValue::Date(d(2020, 2, 29)), Some(1.0)));
    assert_eq!(ba[1], (IndexValue::Date(d(2020, 2, 29)), None));
}

#[test]
fn munge_failure_goes_to_symbol_caching_policy() {
    // integer index cannot be resampled
    let source = StaticSource::new("static")
        .with("ints", Series::from_pairs("ints", [(1i64, Some(1.0)), (2i64, Some(2.0))]))
        .with("ok", Series::from_pairs("ok", [(d(2020, 1, 1), Some(5.0))]));
    let h = harness(source);
    h.manager.create(h.manager.blank("M"), false).unwrap();
    h.manager
        .add_feed(
            "M",
            static_feed("ints").munge(MungeStep::method("resample", Kwargs::new())),
        )
        .unwrap();
    h.manager.add_feed("M", static_feed("ok")).unwrap();

    // default caching policy is silent: absorbed, not reported
    let report = h.pipeline.cache("M", false).unwrap();
    assert!(!report.is_clean());
    assert!(!report.has_handle(SymbolCheckpoint::Caching));
    assert_eq!(final_values(&h, "M"), vec![(IndexValue::Date(d(2020, 1, 1)), Some(5.0))]);

    let config = toml::from_str("caching = [\"raise\"]").unwrap();
    h.manager.update_handle("M", &config).unwrap();
    let err = h.pipeline.cache("M", false).unwrap_err();
    assert_eq!(err.checkpoint(), Some(SymbolCheckpoint::Caching.into()));
}

#[test]
fn unknown_aggregator_leaves_final_missing_when_absorbed() {
    let h = harness(eurcad_source());
    eurcad(&h);
    // bypass manager validation to simulate a registry that lost a method
    let mut symbol = h.storage.load_symbol("EURCAD").unwrap();
    symbol.agg_method = "retired".into();
    symbol.handle.aggregation = BitPolicy::from_flags([Flag::Report]);
    h.storage.save_symbol(&symbol).unwrap();

    let report = h.pipeline.cache("EURCAD", false).unwrap();
    assert!(report.has_handle(SymbolCheckpoint::Aggregation));
    assert!(final_values(&h, "EURCAD").iter().all(|(_, v)| v.is_none()));
}

#[test]
fn invalid_symbol_is_routed_to_validity_check() {
    let h = harness(eurcad_source());
    eurcad(&h);
    h.manager
        .add_validator("EURCAD", "final_in_range", kwargs([("max", 1.31)]))
        .unwrap();
    h.manager
        .add_validator("EURCAD", "no_missing_final", Kwargs::new())
        .unwrap();

    let report = h.pipeline.cache("EURCAD", true).unwrap();
    assert_eq!(report.valid, Some(false));
    assert!(report.has_handle(SymbolCheckpoint::ValidityCheck));
    assert_eq!(report.points_at("validation").count(), 2);

    let (valid, points) = h
        .pipeline
        .check_validity("EURCAD", &["no_missing_final".to_string()])
        .unwrap();
    assert!(valid);
    assert_eq!(points.len(), 1);
}

#[test]
fn check_validity_needs_a_cached_table() {
    let h = harness(eurcad_source());
    eurcad(&h);
    assert!(matches!(
        h.pipeline.check_validity("EURCAD", &[]),
        Err(PipelineError::Storage(StorageError::NoTable(_)))
    ));
}
