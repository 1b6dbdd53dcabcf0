//! Live event list that re-queries the backend on refresh signals and filter changes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{FeedError, FeedSnapshot};

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, only_classified: bool) -> Result<FeedSnapshot, FeedError>;
}

/// What the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedView {
    pub only_classified: bool,
    /// `None` until the first successful fetch.
    pub snapshot: Option<FeedSnapshot>,
    /// True while any fetch is outstanding.
    pub loading: bool,
}

struct FeedState {
    only_classified: bool,
    generation: u64,
    in_flight: usize,
}

pub struct FeedSynchronizer {
    source: Arc<dyn FeedSource>,
    state: Mutex<FeedState>,
    view: watch::Sender<FeedView>,
}

impl FeedSynchronizer {
    pub fn new(source: Arc<dyn FeedSource>, only_classified: bool) -> Self {
        let (view, _) = watch::channel(FeedView {
            only_classified,
            ..FeedView::default()
        });
        Self {
            source,
            state: Mutex::new(FeedState {
                only_classified,
                generation: 0,
                in_flight: 0,
            }),
            view,
        }
    }

    pub fn view(&self) -> FeedView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<FeedView> {
        self.view.subscribe()
    }

    pub fn only_classified(&self) -> bool {
        self.lock().only_classified
    }

    /// Switches the server-side filter and fetches right away.
    ///
    /// Responses still outstanding for the previous filter are discarded.
    pub async fn set_filter(&self, only_classified: bool) {
        {
            let mut state = self.lock();
            state.only_classified = only_classified;
            state.generation += 1;
        }
        log::debug!("feed: filter only_classified={only_classified}");
        self.view
            .send_modify(|view| view.only_classified = only_classified);
        self.refresh().await;
    }

    /// Re-fetches with the current filter. Failures keep the previous snapshot.
    pub async fn refresh(&self) {
        // The loading flag is published under the state lock so overlapping
        // refreshes cannot reorder it.
        let (only_classified, generation) = {
            let mut state = self.lock();
            state.in_flight += 1;
            self.view.send_modify(|view| view.loading = true);
            (state.only_classified, state.generation)
        };

        let result = self.source.fetch(only_classified).await;

        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let snapshot = match result {
            Ok(snapshot) if state.generation == generation => Some(snapshot),
            Ok(_) => {
                log::debug!("feed: discarding result for a previous filter");
                None
            }
            Err(error) => {
                log::warn!("feed: refresh failed, keeping previous list: {error}");
                None
            }
        };

        self.view.send_modify(|view| {
            view.loading = state.in_flight > 0;
            if let Some(snapshot) = snapshot {
                log::debug!(
                    "feed: {} items ({} total)",
                    snapshot.items.len(),
                    snapshot.items_count
                );
                view.snapshot = Some(snapshot);
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
