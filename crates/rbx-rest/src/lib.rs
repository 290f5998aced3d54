//! REST transport and endpoint wrappers for the RabbitX client.
//!
//! The [`Transport`] owns the HTTP client and the signing boundary;
//! endpoint groups (`Account`, `Orders`, `Markets`, `Vaults`, `ApiKeys`)
//! are thin typed wrappers over it. `Transport::get_session_token` is the
//! token source consumed by the realtime connection.

pub mod account;
pub mod apikeys;
pub mod error;
pub mod markets;
pub mod orders;
pub mod response;
pub mod signer;
pub mod transport;
pub mod vaults;

pub use account::{Account, AccountInfo};
pub use apikeys::ApiKeys;
pub use error::{RestError, RestResult};
pub use markets::{Candle, MarketInfo, Markets};
pub use orders::{AmendOrder, CreateOrder, Orders};
pub use response::ApiResponse;
pub use signer::{ApiKey, ApiKeySigner, JwtSigner, Signer};
pub use transport::{Method, Transport};
pub use vaults::Vaults;
