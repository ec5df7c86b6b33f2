//! Single owned runtime context replacing a scheme of process-wide global
//! variables with one `Runtime` built once via [`Runtime::init`] and handed
//! to adapters by shared reference.

use crate::chain::Chain;
use crate::config::{self, BootParams};
use log::LevelFilter;
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};

pub struct Runtime {
    pub chain: Chain,
    pub boot_params: BootParams,
}

impl Runtime {
    /// Parses the boot cmdline, initialises logging at a level derived
    /// from the `debug` token, and takes ownership of an already-loaded
    /// chain. Logging setup failure (e.g. a second `init` call in the
    /// same process) is non-fatal — the runtime still comes up, just
    /// without a logger installed.
    pub fn init(chain: Chain, cmdline: &str) -> Self {
        let boot_params = config::parse(cmdline);
        let level = if boot_params.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        if TermLogger::init(level, LogConfig::default(), TerminalMode::Mixed, ColorChoice::Auto).is_err() {
            log::warn!("logger already initialised; continuing with the existing one");
        }
        Runtime { chain, boot_params }
    }
}
