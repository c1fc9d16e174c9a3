//! # Bedtime
//!
//! Generate a one-sentence bedtime story about a unicorn from a
//! chat-completion API.
//!
//! A run is a single linear pipeline: settings are read from the
//! environment, a metrics endpoint is started, one story is requested (with
//! bounded retries on rate limits and timeouts) and the outcome is printed
//! and mapped to an exit code.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bedtime::{Metrics, Settings, StoryGenerator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let generator = StoryGenerator::new(&settings, Arc::new(Metrics::new()));
//!
//!     let story = generator.generate(false).await?;
//!     println!("{story}");
//!     Ok(())
//! }
//! ```
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | story printed |
//! | 1 | configuration error |
//! | 2 | quota or rate limit exceeded |
//! | 3 | any other API error |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod story;

pub use client::ChatClient;
pub use config::{Args, RetryConfig, Settings};
pub use error::{BedtimeError, ErrorKind, Result};
pub use metrics::{Metrics, MetricsServer};
pub use story::{MOCK_STORY, PROMPT, StoryGenerator};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
