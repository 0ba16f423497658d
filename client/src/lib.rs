//! Session and list machinery for the room booking admin console.
//!
//! [`Console`] is the process-wide entry point. It owns the encrypted
//! [`TokenStore`](token_store::TokenStore), the [`SessionGuard`] that runs
//! before every protected route, and the [`ResourceCache`] behind every
//! [`ListController`].

pub mod app;
pub mod backend;
pub mod bulk_action;
pub mod cipher;
pub mod columns;
pub mod config;
pub mod debounce;
pub mod filter_state;
pub mod list_controller;
pub mod redirect;
pub mod resource;
pub mod resource_cache;
pub mod selection;
pub mod session_guard;
pub mod storage;
pub mod telemetry;
pub mod time;
pub mod token;
pub mod token_store;

pub use app::Console;
pub use backend::{Backend, HttpBackend};
pub use bulk_action::{
    ActionScope, BulkAction, BulkActionCoordinator, BulkOperation,
};
pub use config::Config;
pub use filter_state::{FilterState, FilterUpdate};
pub use list_controller::{ListController, ListView};
pub use redirect::{LoginNotice, LoginRedirect, Navigator};
pub use resource::Resource;
pub use resource_cache::{QueryState, ResourceCache, Scope};
pub use selection::Selection;
pub use session_guard::{Access, SessionGuard, SessionState};
