/* # What is the mazeweb engine?

The engine turns HTTP requests into invocations of an external maze
generator executable and serves back the artifact it writes. It owns the
gateway's domain logic (parameter validation, format negotiation, version
metadata, response construction) and performs every side effect through the
PAL from mazeweb_base, so the whole request path runs under test against
MockPal.
*/

pub mod config;
pub mod formats;
pub mod generate;
pub mod link;
pub mod service;
pub mod version;

pub use config::{GatewayConfig, load_config};
pub use service::GatewayService;
