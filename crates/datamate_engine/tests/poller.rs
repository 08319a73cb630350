use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use datamate_core::{FilterKind, Notice, QueryParams};
use datamate_engine::{
    ApiError, FailureKind, FetchMode, FetcherSettings, ListQuery, NoticeSink, Page, PollTask,
    PollingFetcher,
};
use pretty_assertions::assert_eq;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
struct Call {
    at: Instant,
    params: QueryParams,
}

/// Scripted list endpoint that records every query.
#[derive(Clone, Default)]
struct FakeQuery {
    calls: Arc<Mutex<Vec<Call>>>,
    failures: Arc<Mutex<Vec<FailureKind>>>,
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeQuery {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn fail_next(&self, kind: FailureKind) {
        self.failures.lock().unwrap().push(kind);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ListQuery for FakeQuery {
    type Item = u32;

    async fn query(&self, params: &QueryParams) -> Result<Page<u32>, ApiError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            params: params.clone(),
        });
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(kind) = self.failures.lock().unwrap().pop() {
            return Err(ApiError::new(kind, "scripted failure"));
        }
        Ok(Page {
            content: vec![1, 2, 3],
            total_elements: 42,
        })
    }
}

#[derive(Default)]
struct TestSink {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl TestSink {
    fn take(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().drain(..).collect()
    }
}

impl NoticeSink for TestSink {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

struct CountingTask {
    runs: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl PollTask for CountingTask {
    async fn run(&self) -> Result<(), ApiError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fetcher(
    query: FakeQuery,
    sink: Arc<TestSink>,
    settings: FetcherSettings,
) -> PollingFetcher<FakeQuery, String> {
    PollingFetcher::builder(query, |n: u32| format!("row-{n}"))
        .settings(settings)
        .notices(sink)
        .build()
}

fn polling_every(ms: u64) -> FetcherSettings {
    FetcherSettings {
        polling_interval: Duration::from_millis(ms),
        ..FetcherSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn manual_fetch_maps_rows_and_total() {
    let query = FakeQuery::default();
    let sink = Arc::new(TestSink::default());
    let fetcher = fetcher(query.clone(), sink.clone(), FetcherSettings::default());

    let mut extra = QueryParams::new();
    extra.insert("owner".into(), "me".into());
    fetcher.fetch_data(extra, FetchMode::Manual).await;

    assert_eq!(fetcher.table_data(), vec!["row-1", "row-2", "row-3"]);
    let view = fetcher.view();
    assert_eq!(view.pagination.total, 42);
    assert!(!view.loading);

    let params = &query.calls()[0].params;
    assert_eq!(params["owner"], "me");
    assert_eq!(params["page"], "0");
    assert_eq!(params["size"], "12");
    assert!(sink.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn keyword_change_fetches_once_after_debounce() {
    let query = FakeQuery::default();
    let fetcher = fetcher(
        query.clone(),
        Arc::new(TestSink::default()),
        FetcherSettings::default(),
    );
    fetcher.handle_page_change(3, None);
    sleep(Duration::from_millis(1)).await;
    let start = Instant::now();

    fetcher.handle_keyword_change("fo");
    sleep(Duration::from_millis(100)).await;
    fetcher.handle_keyword_change("foo");
    sleep(Duration::from_millis(499)).await;
    assert_eq!(query.calls().len(), 1, "only the page change fetched so far");

    sleep(Duration::from_millis(2)).await;
    let calls = query.calls();
    assert_eq!(calls.len(), 2);
    let call = &calls[1];
    assert_eq!(call.params["keyword"], "foo");
    assert_eq!(call.params["page"], "0");
    assert!(call.at - start >= Duration::from_millis(600));
    assert_eq!(fetcher.view().search.current, 1);
}

#[tokio::test(start_paused = true)]
async fn page_size_change_fetches_immediately() {
    let query = FakeQuery::default();
    let fetcher = fetcher(
        query.clone(),
        Arc::new(TestSink::default()),
        FetcherSettings::default(),
    );
    fetcher.handle_keyword_change("bar");
    sleep(Duration::from_millis(600)).await;
    fetcher.handle_page_change(2, None);
    sleep(Duration::from_millis(1)).await;
    let before = query.calls().len();
    let start = Instant::now();

    fetcher.handle_page_change(2, Some(24));
    sleep(Duration::from_millis(1)).await;

    let calls = query.calls();
    assert_eq!(calls.len(), before + 1);
    let call = calls.last().unwrap();
    assert!(call.at - start < Duration::from_millis(500));
    assert_eq!(call.params["keyword"], "bar");
    assert_eq!(call.params["size"], "24");
    assert_eq!(call.params["page"], "1");
    assert_eq!(fetcher.view().search.current, 2);
}

#[tokio::test(start_paused = true)]
async fn filter_change_drops_all_sentinel_and_resets_page() {
    let query = FakeQuery::default();
    let settings = FetcherSettings {
        page_offset: 0,
        filter_kinds: [("tags".to_string(), FilterKind::Multi)]
            .into_iter()
            .collect(),
        ..FetcherSettings::default()
    };
    let fetcher = fetcher(query.clone(), Arc::new(TestSink::default()), settings);
    fetcher.handle_page_change(5, None);
    sleep(Duration::from_millis(1)).await;

    let filters: BTreeMap<String, Vec<String>> = [
        ("status".to_string(), vec!["all".to_string()]),
        ("tags".to_string(), vec!["a".to_string(), "b".to_string()]),
    ]
    .into_iter()
    .collect();
    fetcher.handle_filters_change(filters);
    sleep(Duration::from_millis(1)).await;

    let call = query.calls().last().unwrap().clone();
    assert!(!call.params.contains_key("status"));
    assert_eq!(call.params["tags"], "a,b");
    assert_eq!(call.params["page"], "1");
}

#[tokio::test(start_paused = true)]
async fn start_polling_waits_one_interval_before_first_fetch() {
    let query = FakeQuery::default();
    let fetcher = fetcher(query.clone(), Arc::new(TestSink::default()), polling_every(5000));

    fetcher.start_polling();
    assert!(fetcher.is_polling());
    sleep(Duration::from_millis(4999)).await;
    assert!(query.calls().is_empty());

    sleep(Duration::from_millis(2)).await;
    assert_eq!(query.calls().len(), 1);

    sleep(Duration::from_millis(5000)).await;
    assert_eq!(query.calls().len(), 2);
    fetcher.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn polling_ticks_run_extra_tasks_and_stay_silent() {
    let query = FakeQuery::default();
    let runs = Arc::new(AtomicUsize::new(0));
    let fetcher = PollingFetcher::builder(query.clone(), |n: u32| n)
        .settings(polling_every(1000))
        .notices(Arc::new(TestSink::default()))
        .poll_task(Arc::new(CountingTask { runs: runs.clone() }))
        .build();

    fetcher.start_polling();
    sleep(Duration::from_millis(3500)).await;

    assert_eq!(query.calls().len(), 3);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert!(!fetcher.view().loading);
    fetcher.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn fetches_never_overlap() {
    let query = FakeQuery::with_latency(Duration::from_millis(300));
    let fetcher = fetcher(query.clone(), Arc::new(TestSink::default()), polling_every(100));

    fetcher.start_polling();
    for _ in 0..5 {
        sleep(Duration::from_millis(150)).await;
        fetcher.handle_page_change(1, None);
    }
    fetcher.fetch_data(QueryParams::new(), FetchMode::Manual).await;
    sleep(Duration::from_secs(2)).await;
    fetcher.stop_polling();

    assert!(query.calls().len() >= 3);
    assert_eq!(query.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn next_tick_waits_for_slow_fetch() {
    let query = FakeQuery::with_latency(Duration::from_millis(400));
    let fetcher = fetcher(query.clone(), Arc::new(TestSink::default()), polling_every(1000));

    fetcher.start_polling();
    sleep(Duration::from_millis(3000)).await;
    fetcher.stop_polling();

    // Ticks at 1000 and 2400 (1000 + 400 latency + 1000); the third would start at 3800.
    let starts: Vec<_> = query.calls().iter().map(|c| c.at).collect();
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[1] - starts[0], Duration::from_millis(1400));
}

#[tokio::test(start_paused = true)]
async fn manual_fetch_restarts_poll_timer() {
    let query = FakeQuery::default();
    let fetcher = fetcher(query.clone(), Arc::new(TestSink::default()), polling_every(1000));

    fetcher.start_polling();
    sleep(Duration::from_millis(700)).await;
    let manual_at = Instant::now();
    fetcher.fetch_data(QueryParams::new(), FetchMode::Manual).await;
    assert!(fetcher.is_polling());

    sleep(Duration::from_millis(999)).await;
    assert_eq!(query.calls().len(), 1, "old timer must not fire at t=1000");

    sleep(Duration::from_millis(2)).await;
    let calls = query.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].at - manual_at, Duration::from_millis(1000));
    fetcher.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn failures_notify_and_polling_continues() {
    let query = FakeQuery::default();
    let sink = Arc::new(TestSink::default());
    let fetcher = fetcher(query.clone(), sink.clone(), polling_every(1000));

    query.fail_next(FailureKind::HttpStatus(401));
    fetcher.start_polling();
    sleep(Duration::from_millis(1001)).await;
    assert_eq!(sink.take(), vec![Notice::LoginRequired]);

    query.fail_next(FailureKind::Network);
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(sink.take(), vec![Notice::FetchFailed]);

    sleep(Duration::from_millis(1000)).await;
    assert!(sink.take().is_empty());
    assert_eq!(query.calls().len(), 3);
    assert_eq!(fetcher.table_data(), vec!["row-1", "row-2", "row-3"]);
    fetcher.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn stop_polling_twice_is_harmless() {
    let query = FakeQuery::default();
    let fetcher = fetcher(query.clone(), Arc::new(TestSink::default()), polling_every(1000));

    fetcher.start_polling();
    fetcher.stop_polling();
    fetcher.stop_polling();
    assert!(!fetcher.is_polling());

    sleep(Duration::from_secs(5)).await;
    assert!(query.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn auto_refresh_starts_polling_on_build() {
    let query = FakeQuery::default();
    let settings = FetcherSettings {
        auto_refresh: true,
        ..polling_every(1000)
    };
    let fetcher = fetcher(query.clone(), Arc::new(TestSink::default()), settings);
    assert!(fetcher.is_polling());

    sleep(Duration::from_millis(1001)).await;
    assert_eq!(query.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_fetcher_cancels_timers() {
    let query = FakeQuery::default();
    let fetcher = fetcher(query.clone(), Arc::new(TestSink::default()), polling_every(1000));

    fetcher.start_polling();
    fetcher.handle_keyword_change("pending");
    drop(fetcher);

    sleep(Duration::from_secs(5)).await;
    assert!(query.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn builder_applies_initial_search_without_fetching() {
    let query = FakeQuery::default();
    let fetcher = PollingFetcher::builder(query.clone(), |n: u32| n)
        .page(3, Some(24))
        .keyword("cells")
        .filters(BTreeMap::from([(
            "status".to_string(),
            vec!["ACTIVE".to_string()],
        )]))
        .build();

    sleep(Duration::from_secs(1)).await;
    assert!(query.calls().is_empty());

    fetcher.fetch_data(QueryParams::new(), FetchMode::Manual).await;
    let params = &query.calls()[0].params;
    assert_eq!(params["keyword"], "cells");
    assert_eq!(params["status"], "ACTIVE");
    assert_eq!(params["page"], "2");
    assert_eq!(params["size"], "24");
}

#[tokio::test(start_paused = true)]
async fn settled_counts_successes_and_failures() {
    let query = FakeQuery::default();
    let fetcher = fetcher(
        query.clone(),
        Arc::new(TestSink::default()),
        FetcherSettings::default(),
    );
    let mut settled = fetcher.settled();
    assert_eq!(*settled.borrow_and_update(), 0);

    fetcher.fetch_data(QueryParams::new(), FetchMode::Manual).await;
    query.fail_next(FailureKind::Network);
    fetcher.fetch_data(QueryParams::new(), FetchMode::Manual).await;

    assert!(settled.has_changed().unwrap());
    assert_eq!(*settled.borrow_and_update(), 2);
}
