//! # solidario-core
//!
//! Domain types shared by every crate of the solidario backend: the payment
//! ledger entity, users as the payment gateway sees them, in-app
//! notifications, startup configuration and typed bearer-token claims.
//!
//! ## Transaction lifecycle
//!
//! ```text
//!              gateway reports "approved"
//!   ┌─────────┐  (webhook or status poll)  ┌──────┐
//!   │ Pending │ ─────────────────────────▶ │ Done │
//!   └─────────┘                            └──────┘
//!        │
//!        └──── (operator only) ──────────▶ Canceled
//! ```
//!
//! Nothing in this workspace moves a transaction out of `Done`.

pub mod auth;
pub mod config;
pub mod error;
pub mod model;

pub use auth::{Claims, TokenKind, TokenPair, TokenService};
pub use config::AppConfig;
pub use error::{CoreError, Result};
pub use model::{
    NewNotification, NewTransaction, Notification, NotificationDetail, NotificationKind,
    NotificationSender, NotificationTransaction, Transaction, TransactionStatus, User,
};
