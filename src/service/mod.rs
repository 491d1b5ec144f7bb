pub mod http;
pub mod relay;

pub use relay::{RelayService, RelayServiceOpts};
