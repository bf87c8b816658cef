#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::doc_markdown,
    clippy::float_cmp,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod fallback;
pub mod health;
pub mod service;
pub mod session;
pub mod sources;
pub mod store;
pub mod transport;
pub mod util;

pub use app::AppContext;
pub use config::Config;
pub use error::{ApiError, FailureCategory, FailureKind};
pub use fallback::{Environment, FallbackCoordinator, SourceMode};
pub use service::SessionService;
pub use session::{Session, Status};
