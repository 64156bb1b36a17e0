//! HTTP server for the moderation bot.
//!
//! # Endpoints
//!
//! - `GET /` - Webhook verification handshake, or a landing text
//! - `POST /` - Accepts signed webhook deliveries (returns 200 "ok")
//! - `GET /login?sender=<id>&code=<code>` - OAuth redirect target
//! - `POST /channels/{channel_id}/items` - Accepts a submission
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::bot::Chatbot;
use crate::config::Config;
use crate::persistence::Store;
use crate::platform::Platform;
use crate::worker::Dispatcher;

pub mod health;
pub mod login;
pub mod submit;
pub mod webhook;

pub use health::health_handler;
pub use login::login_handler;
pub use submit::submit_handler;
pub use webhook::{verify_handler, webhook_handler};

/// Shared application state, passed to handlers via axum's `State` extractor.
pub struct AppState<P, S> {
    inner: Arc<AppStateInner<P, S>>,
}

struct AppStateInner<P, S> {
    config: Arc<Config>,
    bot: Arc<Chatbot<P, S>>,
    dispatcher: Arc<Dispatcher>,
}

impl<P, S> Clone for AppState<P, S> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Platform, S: Store> AppState<P, S> {
    pub fn new(config: Arc<Config>, bot: Arc<Chatbot<P, S>>, dispatcher: Arc<Dispatcher>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                config,
                bot,
                dispatcher,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn bot(&self) -> &Chatbot<P, S> {
        &self.inner.bot
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<P: Platform, S: Store>(app_state: AppState<P, S>) -> Router {
    Router::new()
        .route(
            "/",
            get(verify_handler::<P, S>).post(webhook_handler::<P, S>),
        )
        .route("/login", get(login_handler::<P, S>))
        .route("/channels/{channel_id}/items", post(submit_handler::<P, S>))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
