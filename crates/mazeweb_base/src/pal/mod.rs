/* # What is the Platform Abstraction Layer?

The PAL is a trait-based abstraction over the gateway's side effects:
filesystem access, external command execution, and HTTP serving. Code depends
on the Pal trait, so tests run against MockPal with no processes spawned and
no network or disk touched.
*/

mod command;
mod file_path;
pub mod http;
pub mod mock;
pub mod real_pal;
mod traits;

pub use command::{CommandOutput, CommandSpec, CommandStatus};
pub use file_path::FilePath;
pub use mock::MockPal;
pub use real_pal::RealPal;
pub use traits::{Pal, PalHandle, ReadSeek};
