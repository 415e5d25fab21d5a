//! Request lifecycle for chat sessions: inbound fragments are debounced into
//! jobs, jobs are dispatched by priority to a worker pool, workers run the
//! mode handler and the answer is delivered through a [`transport`].

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod delivery;
pub mod handlers;
pub mod i18n;
pub mod runtime;
pub mod sessions;
pub mod state;
pub mod transport;
pub mod voice;
