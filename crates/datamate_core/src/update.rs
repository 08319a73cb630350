use std::time::Duration;

use crate::{Effect, FetchFailure, Msg, Notice, SearchState, KEYWORD_DEBOUNCE};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: SearchState, msg: Msg) -> (SearchState, Vec<Effect>) {
    let effects = match msg {
        Msg::KeywordChanged(keyword) => {
            // Clearing the keyword refreshes right away; typing waits for a quiet period.
            let delay = if keyword.is_empty() {
                Duration::ZERO
            } else {
                KEYWORD_DEBOUNCE
            };
            state.set_keyword(keyword);
            vec![Effect::ScheduleFetch { delay }]
        }
        Msg::FiltersChanged(filters) => {
            state.merge_filters(filters);
            vec![Effect::ScheduleFetch {
                delay: Duration::ZERO,
            }]
        }
        Msg::PageChanged { current, page_size } => {
            state.set_page(current, page_size);
            vec![Effect::ScheduleFetch {
                delay: Duration::ZERO,
            }]
        }
        Msg::FetchStarted { background } => {
            if !background {
                state.set_loading(true);
            }
            Vec::new()
        }
        Msg::FetchSucceeded { total } => {
            state.set_total(total);
            state.set_loading(false);
            Vec::new()
        }
        Msg::FetchFailed { failure } => {
            state.set_loading(false);
            let notice = match failure {
                FetchFailure::Unauthorized => Notice::LoginRequired,
                FetchFailure::Other => Notice::FetchFailed,
            };
            vec![Effect::Notify(notice)]
        }
        Msg::PollingChanged(polling) => {
            state.set_polling(polling);
            Vec::new()
        }
    };

    (state, effects)
}
