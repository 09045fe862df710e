//! Plumbing shared by the `migrate` and `rollback` binaries

use crate::settings::{Environment, Settings};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use cutover_store::{connect, ConnectOptions, DataStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Variable holding the log filter
pub const LOG_ENV: &str = "CUTOVER_LOG";

/// Arguments both binaries accept
#[must_use]
pub fn with_common_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("root")
                .long("root")
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Repository root"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Settings file (default: <root>/cutover.toml if present)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
}

/// Install the global subscriber; filter from `CUTOVER_LOG`, default `info`
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
    if let Err(e) = installed {
        eprintln!("logging already initialized: {e}");
    }
}

/// Root, settings and environment resolved from common arguments
#[derive(Debug)]
pub struct Invocation {
    /// Repository root
    pub root: PathBuf,
    /// Loaded settings
    pub settings: Settings,
    /// Captured environment
    pub env: Environment,
}

impl Invocation {
    /// Resolve from parsed arguments
    ///
    /// # Errors
    /// Unreadable or malformed settings
    pub fn from_matches(matches: &ArgMatches) -> anyhow::Result<Self> {
        let root = matches
            .get_one::<PathBuf>("root")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        let settings = Settings::load(&root, matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
        Ok(Self {
            root,
            settings,
            env: Environment::capture(),
        })
    }

    /// Open the data store named by the environment
    ///
    /// # Errors
    /// Missing environment values or an unusable URL
    pub fn connect_store(&self, request_tag: String) -> anyhow::Result<Arc<dyn DataStore>> {
        let values = self.env.require_data_store()?;
        let store = connect(
            &values.url,
            &ConnectOptions {
                service_key: values.service_key,
                probe_table: self.settings.store.probe_table().to_string(),
                identity_field: self.settings.store.identity_field.clone(),
                request_tag: Some(request_tag),
            },
        )?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_args_parse() {
        let matches = with_common_args(Command::new("t"))
            .try_get_matches_from(["t", "--root", "/repo", "--log-json"])
            .unwrap();
        assert_eq!(matches.get_one::<PathBuf>("root"), Some(&PathBuf::from("/repo")));
        assert!(matches.get_flag("log-json"));
        assert!(matches.get_one::<PathBuf>("config").is_none());
    }
}
