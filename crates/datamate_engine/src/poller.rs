use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use client_logging::{client_debug, client_warn};
use datamate_core::{
    update, Effect, FetchFailure, FilterKind, ListViewModel, Msg, QueryParams, SearchState,
    DEFAULT_PAGE_SIZE_OPTIONS,
};
use futures_util::future::{try_join, try_join_all};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::fetch::{ListQuery, PollTask};
use crate::notice::{LogNoticeSink, NoticeSink};
use crate::{ApiError, Page};

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub polling_interval: Duration,
    /// Start polling as soon as the fetcher is built.
    pub auto_refresh: bool,
    /// Subtracted from the 1-based page before it is sent.
    pub page_offset: u32,
    pub page_size_options: Vec<u32>,
    pub filter_kinds: BTreeMap<String, FilterKind>,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(30),
            auto_refresh: false,
            page_offset: 1,
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
            filter_kinds: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Caller-initiated: shows loading and restarts a running poll timer.
    Manual,
    /// Scheduled by the poll loop: silent, leaves the timer alone.
    PollTick,
}

type MapFn<I, T> = dyn Fn(I) -> T + Send + Sync;

struct Shared<T> {
    search: SearchState,
    table_data: Vec<T>,
}

struct Inner<Q: ListQuery, T> {
    query: Q,
    map: Box<MapFn<Q::Item, T>>,
    poll_tasks: Vec<Arc<dyn PollTask>>,
    settings: FetcherSettings,
    notices: Arc<dyn NoticeSink>,
    shared: Mutex<Shared<T>>,
    // Held for the whole fetch so no two fetches of one fetcher overlap.
    in_flight: tokio::sync::Mutex<()>,
    poll_timer: Mutex<Option<CancellationToken>>,
    debounce: Mutex<Option<CancellationToken>>,
    // Bumped each time a fetch settles, successfully or not.
    settled: watch::Sender<u64>,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct FetcherBuilder<Q: ListQuery, T> {
    query: Q,
    map: Box<MapFn<Q::Item, T>>,
    poll_tasks: Vec<Arc<dyn PollTask>>,
    settings: FetcherSettings,
    notices: Arc<dyn NoticeSink>,
    initial: Vec<Msg>,
}

impl<Q, T> FetcherBuilder<Q, T>
where
    Q: ListQuery + 'static,
    T: Send + 'static,
{
    pub fn settings(mut self, settings: FetcherSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn notices(mut self, notices: Arc<dyn NoticeSink>) -> Self {
        self.notices = notices;
        self
    }

    /// Adds work that runs concurrently with every list fetch.
    pub fn poll_task(mut self, task: Arc<dyn PollTask>) -> Self {
        self.poll_tasks.push(task);
        self
    }

    /// Initial keyword. Applied at build time without scheduling a fetch.
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.initial.push(Msg::KeywordChanged(keyword.into()));
        self
    }

    /// Initial filter selection, applied like [`PollingFetcher::handle_filters_change`].
    pub fn filters(mut self, filters: BTreeMap<String, Vec<String>>) -> Self {
        self.initial.push(Msg::FiltersChanged(filters));
        self
    }

    /// Initial page, applied after keyword and filters so it is not reset.
    pub fn page(mut self, current: u32, page_size: Option<u32>) -> Self {
        self.initial.push(Msg::PageChanged { current, page_size });
        self
    }

    /// Builds the fetcher. With `auto_refresh` set this spawns the poll loop
    /// and so must run inside a tokio runtime.
    pub fn build(self) -> PollingFetcher<Q, T> {
        let mut search = SearchState::new(self.settings.page_size_options.clone());
        // Keyword and filter changes reset the page, so the page goes last.
        let (pages, others): (Vec<Msg>, Vec<Msg>) = self
            .initial
            .into_iter()
            .partition(|msg| matches!(msg, Msg::PageChanged { .. }));
        for msg in others.into_iter().chain(pages) {
            // Scheduling effects are dropped; the caller fetches when ready.
            search = update(search, msg).0;
        }
        let auto_refresh = self.settings.auto_refresh;
        let fetcher = PollingFetcher {
            inner: Arc::new(Inner {
                query: self.query,
                map: self.map,
                poll_tasks: self.poll_tasks,
                settings: self.settings,
                notices: self.notices,
                shared: Mutex::new(Shared {
                    search,
                    table_data: Vec::new(),
                }),
                in_flight: tokio::sync::Mutex::new(()),
                poll_timer: Mutex::new(None),
                debounce: Mutex::new(None),
                settled: watch::channel(0).0,
            }),
        };
        if auto_refresh {
            fetcher.start_polling();
        }
        fetcher
    }
}

/// Keeps a list view in sync with a remote list endpoint.
///
/// Parameter changes schedule a fetch (keyword edits debounced), and an
/// optional poll loop refetches every `polling_interval`. Scheduling policy:
/// - one fetch at a time per fetcher; manual, debounced and polled fetches queue up;
/// - the next tick is armed only after the previous fetch settled;
/// - failures become notices and are never retried, the loop just waits for the next tick.
///
/// Dropping the fetcher cancels the poll loop and any pending debounced fetch.
pub struct PollingFetcher<Q: ListQuery, T> {
    inner: Arc<Inner<Q, T>>,
}

impl<Q, T> PollingFetcher<Q, T>
where
    Q: ListQuery + 'static,
    T: Send + 'static,
{
    pub fn builder(
        query: Q,
        map: impl Fn(Q::Item) -> T + Send + Sync + 'static,
    ) -> FetcherBuilder<Q, T> {
        FetcherBuilder {
            query,
            map: Box::new(map),
            poll_tasks: Vec::new(),
            settings: FetcherSettings::default(),
            notices: Arc::new(LogNoticeSink),
            initial: Vec::new(),
        }
    }

    /// Fetches the current page now, merging `extra` under the search fields.
    pub async fn fetch_data(&self, extra: QueryParams, mode: FetchMode) {
        Inner::run_fetch(&self.inner, extra, mode, None).await;
    }

    /// Arms the poll loop. The first tick fires after one interval, not now.
    pub fn start_polling(&self) {
        self.inner.dispatch(Msg::PollingChanged(true));
        Inner::arm_poll_loop(&self.inner);
    }

    pub fn stop_polling(&self) {
        self.inner.clear_poll_timer();
        self.inner.dispatch(Msg::PollingChanged(false));
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.shared).search.is_polling()
    }

    pub fn handle_keyword_change(&self, keyword: impl Into<String>) {
        let effects = self.inner.dispatch(Msg::KeywordChanged(keyword.into()));
        Inner::run_effects(&self.inner, effects);
    }

    pub fn handle_filters_change(&self, filters: BTreeMap<String, Vec<String>>) {
        let effects = self.inner.dispatch(Msg::FiltersChanged(filters));
        Inner::run_effects(&self.inner, effects);
    }

    pub fn handle_page_change(&self, current: u32, page_size: Option<u32>) {
        let effects = self
            .inner
            .dispatch(Msg::PageChanged { current, page_size });
        Inner::run_effects(&self.inner, effects);
    }

    pub fn view(&self) -> ListViewModel {
        lock(&self.inner.shared).search.view()
    }

    /// Watches the number of settled fetches. Changes once per fetch that
    /// finished, whether it succeeded or raised a notice.
    pub fn settled(&self) -> watch::Receiver<u64> {
        self.inner.settled.subscribe()
    }
}

impl<Q, T> PollingFetcher<Q, T>
where
    Q: ListQuery + 'static,
    T: Clone + Send + 'static,
{
    pub fn table_data(&self) -> Vec<T> {
        lock(&self.inner.shared).table_data.clone()
    }
}

impl<Q: ListQuery, T> Drop for PollingFetcher<Q, T> {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.inner.poll_timer).take() {
            token.cancel();
        }
        if let Some(token) = lock(&self.inner.debounce).take() {
            token.cancel();
        }
    }
}

impl<Q, T> Inner<Q, T>
where
    Q: ListQuery + 'static,
    T: Send + 'static,
{
    /// Runs a message through the core update and returns its effects.
    /// `Notify` effects are delivered here; scheduling is left to the caller.
    fn dispatch(&self, msg: Msg) -> Vec<Effect> {
        let effects = {
            let mut shared = lock(&self.shared);
            let state = std::mem::take(&mut shared.search);
            let (state, effects) = update(state, msg);
            shared.search = state;
            effects
        };

        let mut pending = Vec::new();
        for effect in effects {
            match effect {
                Effect::Notify(notice) => self.notices.notify(notice),
                other => pending.push(other),
            }
        }
        pending
    }

    fn run_effects(inner: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ScheduleFetch { delay } => Inner::schedule_fetch(inner, delay),
                Effect::Notify(notice) => inner.notices.notify(notice),
            }
        }
    }

    /// Replaces any pending scheduled fetch with one that fires after `delay`.
    fn schedule_fetch(inner: &Arc<Self>, delay: Duration) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&inner.debounce).replace(token.clone()) {
            previous.cancel();
        }
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    Inner::run_fetch(&inner, QueryParams::new(), FetchMode::Manual, None).await;
                }
            }
        });
    }

    fn arm_poll_loop(inner: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&inner.poll_timer).replace(token.clone()) {
            previous.cancel();
        }
        let interval = inner.settings.polling_interval;
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                Inner::run_fetch(&inner, QueryParams::new(), FetchMode::PollTick, Some(&token))
                    .await;
                if token.is_cancelled() {
                    break;
                }
            }
        });
    }

    fn clear_poll_timer(&self) {
        if let Some(token) = lock(&self.poll_timer).take() {
            token.cancel();
        }
    }

    async fn run_fetch(
        inner: &Arc<Self>,
        extra: QueryParams,
        mode: FetchMode,
        tick: Option<&CancellationToken>,
    ) {
        let _guard = inner.in_flight.lock().await;
        // A tick that queued behind a manual fetch belongs to a stopped loop.
        if tick.is_some_and(CancellationToken::is_cancelled) {
            return;
        }

        let background = mode == FetchMode::PollTick;
        let was_polling = !background && lock(&inner.shared).search.is_polling();
        if was_polling {
            inner.clear_poll_timer();
        }

        inner.dispatch(Msg::FetchStarted { background });
        let query = {
            let shared = lock(&inner.shared);
            shared.search.params().to_query(
                &extra,
                inner.settings.page_offset,
                &inner.settings.filter_kinds,
            )
        };
        client_debug!("Fetching list mode={:?} query={:?}", mode, query);

        match inner.query_all(&query).await {
            Ok(page) => {
                let total = page.total_elements;
                let rows: Vec<T> = page.content.into_iter().map(|item| (inner.map)(item)).collect();
                lock(&inner.shared).table_data = rows;
                inner.dispatch(Msg::FetchSucceeded { total });
            }
            Err(err) => {
                client_warn!("List fetch failed: {}", err);
                let failure = if err.is_unauthorized() {
                    FetchFailure::Unauthorized
                } else {
                    FetchFailure::Other
                };
                inner.dispatch(Msg::FetchFailed { failure });
            }
        }
        inner.settled.send_modify(|count| *count += 1);

        // Still polling unless stop_polling ran meanwhile.
        if was_polling && lock(&inner.shared).search.is_polling() {
            Inner::arm_poll_loop(inner);
        }
    }

    async fn query_all(&self, query: &QueryParams) -> Result<Page<Q::Item>, ApiError> {
        let extras = try_join_all(self.poll_tasks.iter().map(|task| task.run()));
        let (page, _) = try_join(self.query.query(query), extras).await?;
        Ok(page)
    }
}
