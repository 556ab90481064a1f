//! HTTP gateway: merges the per-endpoint subrouters and attaches shared state.

use std::sync::Arc;

use axum::Router;

use crate::{Config, SensorSource};

mod health;
mod history;
mod status;

// ---

/// State shared by every route: the injected data source and the config snapshot.
pub type AppState<S> = (Arc<S>, Config);

pub fn router<S: SensorSource>(source: S, config: Config) -> Router {
    // ---
    Router::new()
        .merge(history::router::<S>())
        .merge(status::router::<S>())
        .merge(health::router::<AppState<S>>())
        .with_state((Arc::new(source), config))
}
