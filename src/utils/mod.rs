pub mod clock;
pub mod http;
pub mod text;

pub use clock::{Clock, FixedClock, SystemClock};
pub use http::{build_http_client, sanitize_api_error};
pub use text::{truncate_chars, truncate_with_ellipsis};
