use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use lattice_wm::actor::reactor::{self, Scenario};
use lattice_wm::common::config::{Config, config_file};
use lattice_wm::common::log;
use tracing::{info, warn};

#[derive(Parser)]
struct Cli {
    /// Configuration file to use instead of ~/.lattice.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Check the configuration and report every problem found, then exit.
    #[arg(long)]
    validate: bool,

    /// Replay a recorded session or scenario file and print the resulting
    /// layout. Use `-` to read it from stdin.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Record reactor events to the specified file path. Overwrites the file if
    /// exists.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Print the effective configuration as TOML.
    #[arg(long)]
    print_config: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let opt: Cli = Parser::parse();

    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // SAFETY: We are single threaded at this point.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    log::init_logging();

    let path = opt.config.clone().unwrap_or_else(config_file);
    let mut config =
        Config::load_or_default(&path).with_context(|| format!("loading {}", path.display()))?;

    let issues = config.validate();
    if opt.validate {
        for issue in &issues {
            println!("{issue}");
        }
        return Ok(if issues.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }
    for issue in &issues {
        warn!(%issue, "configuration problem");
    }
    let fixed = config.auto_fix_values();
    if fixed > 0 {
        info!(fixed, "corrected out-of-range configuration values");
    }

    if opt.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(source) = opt.replay else {
        anyhow::bail!("nothing to do: pass --replay <file> (or --replay - for stdin)");
    };
    let record = reactor::Record::new(opt.record.as_deref())?;
    let layout = if source.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Scenario::parse(&text)?.run(config, record)
    } else {
        reactor::replay(&source, config, record)
            .with_context(|| format!("replaying {}", source.display()))?
    };
    print!("{layout}");
    Ok(ExitCode::SUCCESS)
}
