//! # linode-rest - typed access to the Linode REST API
//!
//! Every resource type goes through the same engine: a request descriptor is
//! rendered once, sent through a pluggable transport, retried on transient
//! failures, and the response is decoded either into the resource's type or
//! into a structured [`ApiError`]. Listings walk pages transparently.
//!
//! ## Quick Start
//!
//! ```no_run
//! use linode_rest::{Client, ErrorKind, ListOptions};
//! use linode_rest::users::{UserCreateOptions, UserUpdateOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), linode_rest::Error> {
//!     let client = Client::builder()
//!         .token("my-token")
//!         .timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     let users = client.users();
//!
//!     let created = users
//!         .create(&UserCreateOptions {
//!             username: "t-user".to_string(),
//!             email: "t@example.com".to_string(),
//!             restricted: true,
//!         })
//!         .await?;
//!
//!     let updated = users
//!         .update(
//!             &created.username,
//!             &UserUpdateOptions {
//!                 restricted: Some(false),
//!                 ..Default::default()
//!             },
//!         )
//!         .await?;
//!     assert!(!updated.restricted);
//!
//!     let all = users.list(Some(&ListOptions::new().page_size(25))).await?;
//!     println!("{} users", all.len());
//!
//!     users.delete(&created.username).await?;
//!     match users.delete(&created.username).await {
//!         Err(e) if e.kind() == ErrorKind::NotFound => println!("already gone"),
//!         other => other?,
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Adding a resource
//!
//! Implement [`Resource`] with the collection and item path templates and
//! the item, create and update types, then use [`Client::resources`]. See the
//! [`users`] module for a complete example.
//!
//! ## Retries
//!
//! 429, 5xx, timeouts and connection failures are retried with exponential
//! backoff and jitter (see [`RetryStrategy`]). Creates are only retried
//! through [`Resources::create_idempotent`]. When every attempt fails, the
//! last error is returned with its status code intact.
//!
//! ## Cancellation
//!
//! Scope a client to a [`CancelToken`] with [`Client::with_cancel_token`];
//! canceling aborts the in-flight request, pending backoff and remaining
//! pages with [`Error::Canceled`].

mod cancel;
mod client;
mod error;
pub mod metadata;
pub mod pagination;
pub mod rate_limit;
mod resource;
mod response;
pub mod retry;
pub mod transport;
pub mod users;

pub use cancel::CancelToken;
pub use client::{Client, ClientBuilder, DEFAULT_BASE_URL};
pub use error::{ApiError, Error, ErrorKind, ErrorReason, Result};
pub use pagination::{ListOptions, Page, PageDescriptor, PageStream};
pub use resource::{Resource, Resources};
pub use response::Response;
pub use retry::{RetryPredicate, RetryStrategy};
