//! Binary entrypoint for vnkey.
use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use logging::LogArgs;
use tracing::{debug, error};
use vnkey_engine::{Error, Result, Settings, smart_switch};

/// Engine used by `monitor`.
#[cfg(any(target_os = "macos", test))]
mod engine;
/// Live tap wiring.
#[cfg(target_os = "macos")]
mod monitor;

#[derive(Parser, Debug)]
#[command(name = "vnkey", about = "Vietnamese input method event tap", version)]
/// Command-line interface for the `vnkey` binary.
struct Cli {
    /// What to do.
    #[command(subcommand)]
    command: Command,

    /// Logging controls
    #[command(flatten)]
    log: LogArgs,

    /// Optional path to the JSON settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for persisted state (defaults to ~/.vnkey)
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
/// Top-level CLI subcommands.
enum Command {
    /// Install the event tap with a pass-through engine and log every decision.
    Monitor,
    /// Print Accessibility and Input Monitoring status.
    Permissions {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load and validate a settings file then exit.
    CheckConfig {
        /// Settings file to check
        path: PathBuf,

        /// Dump the normalized settings as JSON to stdout
        #[arg(long)]
        dump: bool,
    },
    /// Inspect the per-app language table.
    SmartSwitch {
        /// Table operation.
        #[command(subcommand)]
        command: SmartSwitchCommand,
    },
}

#[derive(Subcommand, Debug)]
/// `smart-switch` operations.
enum SmartSwitchCommand {
    /// Decode a persisted table and print one entry per line.
    Dump {
        /// Persisted table file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    if !logging::init_subscriber(&cli.log.spec()) {
        eprintln!("vnkey: a tracing subscriber was already installed");
    }

    let res = match &cli.command {
        Command::Monitor => run_monitor(&cli),
        Command::Permissions { json } => print_permissions(*json),
        Command::CheckConfig { path, dump } => check_config(path, *dump),
        Command::SmartSwitch {
            command: SmartSwitchCommand::Dump { file },
        } => dump_smart_switch(file),
    };
    if let Err(e) = res {
        error!(error = %e, "command_failed");
        eprintln!("vnkey: {e}");
        process::exit(1);
    }
}

/// Settings from `--config`, or the defaults.
fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(p) => Settings::load(p),
        None => {
            debug!("settings_defaulted");
            Ok(Settings::default())
        }
    }
}

/// `--state-dir`, else `~/.vnkey`, else `./.vnkey`.
fn state_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    env::var_os("HOME")
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join(".vnkey")
}

#[cfg(target_os = "macos")]
/// Run the live tap until the process is killed.
fn run_monitor(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;
    monitor::run(settings, &state_dir(cli.state_dir.as_deref()))
}

#[cfg(not(target_os = "macos"))]
/// The tap only exists on macOS.
fn run_monitor(cli: &Cli) -> Result<()> {
    load_settings(cli.config.as_deref())?;
    debug!(state_dir = %state_dir(cli.state_dir.as_deref()).display(), "monitor_unavailable");
    Err(Error::Msg("monitor requires macOS".into()))
}

/// `permissions`
fn print_permissions(json: bool) -> Result<()> {
    let status = permissions::check_permissions();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    let word = |ok: bool| if ok { "granted" } else { "missing" };
    println!("accessibility:    {}", word(status.accessibility_ok));
    println!("input monitoring: {}", word(status.input_ok));
    if !status.all_granted() {
        return Err(Error::Msg("permissions missing".into()));
    }
    Ok(())
}

/// `check-config`
fn check_config(path: &Path, dump: bool) -> Result<()> {
    let settings = Settings::load(path)?;
    if dump {
        println!("{}", settings.to_json_pretty()?);
    } else {
        println!("{}: ok", path.display());
    }
    Ok(())
}

/// `smart-switch dump`
fn dump_smart_switch(file: &Path) -> Result<()> {
    let bytes = fs::read(file)?;
    for line in smart_switch_lines(&bytes) {
        println!("{line}");
    }
    Ok(())
}

/// One `bundle_id language code_table` line per decoded entry.
fn smart_switch_lines(bytes: &[u8]) -> Vec<String> {
    smart_switch::decode(bytes)
        .into_iter()
        .map(|(id, state)| {
            let (language, table) = smart_switch::unpack(state);
            format!("{id} {language:?} {table:?}")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use vnkey_engine::{CodeTable, Language};

    use super::*;

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["vnkey", "--debug", "check-config", "s.json", "--dump"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Command::CheckConfig { dump: true, .. })
        ));
        let cli = Cli::try_parse_from(["vnkey", "smart-switch", "dump", "table.bin"]);
        assert!(cli.is_ok());
        assert!(Cli::try_parse_from(["vnkey", "--trace", "--debug", "monitor"]).is_err());
    }

    #[test]
    fn dump_lines_are_sorted_and_decoded() {
        let mut m = BTreeMap::new();
        m.insert(
            "com.b".to_string(),
            smart_switch::pack(Language::English, CodeTable::Unicode),
        );
        m.insert(
            "com.a".to_string(),
            smart_switch::pack(Language::Vietnamese, CodeTable::VniWindows),
        );
        let lines = smart_switch_lines(&smart_switch::encode(&m));
        assert_eq!(
            lines,
            vec!["com.a Vietnamese VniWindows", "com.b English Unicode"]
        );
    }

    #[test]
    fn explicit_state_dir_wins() {
        assert_eq!(state_dir(Some(Path::new("/tmp/x"))), PathBuf::from("/tmp/x"));
        assert!(state_dir(None).ends_with(".vnkey"));
    }
}
