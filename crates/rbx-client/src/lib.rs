//! High-level RabbitX client.
//!
//! Two usage styles over the same engine:
//! - cooperative: [`RabbitX::ws`] yields an awaitable realtime client
//!   driven by `run()` on the caller's runtime
//! - blocking: [`BlockingClient`] owns a background runtime and exposes
//!   `start()`/`stop()` plus REST calls that block until a result
//!
//! ```no_run
//! use rbx_client::{BlockingClient, Credentials, RabbitX};
//! use rbx_core::Network;
//! use rbx_rest::ApiKey;
//! use rbx_ws::Orderbook;
//!
//! # fn main() -> Result<(), rbx_client::ClientError> {
//! let client = RabbitX::new(
//!     Network::Mainnet,
//!     Credentials::ApiKey(ApiKey::from_file(".apikey/apiKey.json")?),
//! )?;
//! let blocking = BlockingClient::new(client)?;
//!
//! let book = Orderbook::new("BTC-USD");
//! blocking.register_handler(book.topic(), book.clone());
//! blocking.start();
//! // ... later:
//! println!("best bid: {:?}", book.best_bid());
//! blocking.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod client;
pub mod error;
pub mod logging;

pub use blocking::BlockingClient;
pub use client::{Credentials, RabbitX};
pub use error::{ClientError, ClientResult};
pub use logging::init_logging;

pub use rbx_core::Network;
