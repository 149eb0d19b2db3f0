use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use postmedia::app::Options;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

fn main() {
    init_tracing();

    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(Some(opts)) => opts,
        Ok(None) => return,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = postmedia::run(opts) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns `None` when a flag was fully handled (help, version).
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Options>> {
    let mut opts = Options::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("postmedia {}", postmedia::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!(
                    "postmedia — Decide how a Reddit post's media should be rendered.\n\n  postmedia [OPTIONS] [FILE|-]\n\n  --compact            Use compact thumbnail sizing\n  --width <POINTS>     Available width (default {})\n  --config <PATH>      Config file to load\n  --wait <SECS>        Fetch linked entities and wait for them\n  --resolve            Look up redgifs media details\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message",
                    postmedia::app::DEFAULT_WIDTH
                );
                return Ok(None);
            }
            "--compact" => opts.compact = true,
            "--resolve" => opts.resolve = true,
            "--width" => {
                let value = args.next().ok_or_else(|| anyhow!("--width needs a value"))?;
                opts.width = value
                    .parse()
                    .map_err(|_| anyhow!("invalid --width {value:?}"))?;
            }
            "--wait" => {
                let value = args.next().ok_or_else(|| anyhow!("--wait needs a value"))?;
                let secs: f64 = value
                    .parse()
                    .map_err(|_| anyhow!("invalid --wait {value:?}"))?;
                if !secs.is_finite() || secs < 0.0 {
                    bail!("invalid --wait {value:?}");
                }
                opts.wait = Some(Duration::from_secs_f64(secs));
            }
            "--config" => {
                let value = args.next().ok_or_else(|| anyhow!("--config needs a value"))?;
                opts.config_file = Some(PathBuf::from(value));
            }
            other if other.starts_with("--") => bail!("unknown flag {other}"),
            other => {
                if opts.input.is_some() {
                    bail!("only one input file is accepted");
                }
                opts.input = Some(PathBuf::from(other));
            }
        }
    }
    Ok(Some(opts))
}
