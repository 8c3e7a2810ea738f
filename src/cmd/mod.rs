//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `watch`  | `Watch`          |
//! | `config` | `Config`         |

pub mod config;
pub mod run;
pub mod watch;

pub use config::cmd_config;
pub use run::{RunOptions, cmd_run};
pub use watch::cmd_watch;
