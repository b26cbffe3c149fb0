// 2.0: exchange REST access. signed and public requests over a swappable transport,
// with clock-drift correction on timestamp rejection.

mod error;
mod signed;
mod signing;
mod transport;
mod wire;

pub use error::ClientError;
pub use signed::{SignedRequestClient, ACCOUNT_PATH, INCOME_PATH, POSITION_RISK_PATH, SERVER_TIME_PATH};
pub use signing::{canonical_query, sign_query};
pub use transport::{HttpReply, HttpRequest, HttpTransport, MockTransport, Transport};
pub use wire::{parse_decimal, parse_i64};
