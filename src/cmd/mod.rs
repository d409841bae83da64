//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled          |
//! |----------|---------------------------|
//! | `run`    | `Run`                     |
//! | `watch`  | `Watch`                   |
//! | `status` | `List`, `Status`, `Reset` |

pub mod run;
pub mod status;
pub mod watch;

pub use run::cmd_run;
pub use status::{cmd_list, cmd_reset, cmd_status};
pub use watch::cmd_watch;
