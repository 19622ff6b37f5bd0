//! # Courier Core
//!
//! Platform-neutral building blocks shared by every layer of Courier.
//!
//! - **Events**: the [`Event`] trait, its [`UpdateType`] discriminant and the
//!   type-erased [`BoxedEvent`] container that travels through the pipeline.
//! - **Payloads**: typed events for the update kinds the engine cares about
//!   ([`MessageCreated`], [`MessageCallback`], [`BotStarted`], ...).
//! - **Client**: the [`Client`] collaborator a dispatcher binds to during
//!   readiness, with its append-only [`CommandRegistry`].
//! - **Transport**: the [`UpdateSource`] boundary through which decoded
//!   updates enter the process.
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌───────────┐
//! │ UpdateSource │────▶│ Dispatcher │────▶│  Handler  │──▶ Client
//! └──────────────┘     └────────────┘     └───────────┘
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod transport;
pub mod types;

pub use client::{
    BotInfo, BoxedClient, Client, CommandRegistry, CommandsInfo, MessageTarget, Subscription,
};
pub use error::{ApiError, ApiResult, BoxError, TransportError, TransportResult};
pub use event::{BoxedEvent, Event, ParseUpdateTypeError, UpdateType};
pub use transport::{BoxedUpdateSource, FetchOptions, UpdateSource};
pub use types::{
    BotAdded, BotStarted, Callback, Message, MessageBody, MessageCallback, MessageCreated,
    RawUpdate, Recipient, User,
};
