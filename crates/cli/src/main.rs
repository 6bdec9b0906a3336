use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use setval_core::{KubeObject, ResourceList};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "set-value", version, about = "KRM function: copy a value into fields of selected resources")]
struct Cli {
    /// Output format of the resulting ResourceList
    #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Yaml)]
    output: Output,

    /// Read the ResourceList from a file instead of stdin
    #[arg(short = 'i', long = "input", env = "SET_VALUE_INPUT")]
    input: Option<PathBuf>,

    /// Write the ResourceList to a file instead of stdout
    #[arg(long = "out-file")]
    out_file: Option<PathBuf>,

    /// SetValue config file; replaces the functionConfig carried by the ResourceList
    fn_config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Yaml, Json }

fn init_tracing() {
    let env = std::env::var("SET_VALUE_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // stdout carries the ResourceList
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn max_input_bytes() -> usize {
    std::env::var("SET_VALUE_MAX_INPUT_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(16 * 1024 * 1024) // 16 MiB default
}

fn read_input(path: Option<&Path>, max: usize) -> Result<String> {
    let mut buf = String::new();
    match path {
        Some(p) if p != Path::new("-") => {
            std::fs::File::open(p)
                .with_context(|| format!("opening {}", p.display()))?
                .take(max as u64 + 1)
                .read_to_string(&mut buf)
                .with_context(|| format!("reading {}", p.display()))?;
        }
        _ => {
            std::io::stdin().lock().take(max as u64 + 1).read_to_string(&mut buf).context("reading stdin")?;
        }
    }
    if buf.len() > max {
        return Err(anyhow!("input too large (>{} bytes)", max));
    }
    Ok(buf)
}

fn process(input: &str, fn_config: Option<&str>, output: Output) -> Result<String> {
    let mut rl = ResourceList::parse(input).context("parsing ResourceList")?;
    if let Some(text) = fn_config {
        rl.function_config = Some(KubeObject::parse(text).context("parsing functionConfig")?);
    }
    info!(items = rl.items.len(), "set-value invoked");

    let report = setval_transform::run(&mut rl);
    info!(fields = report.fields_set(), mutations = report.mutations.len(), results = rl.results.len(), "set-value finished");
    if rl.has_errors() {
        warn!(results = rl.results.len(), "function reported errors; see ResourceList.results");
    }

    let out = match output {
        Output::Yaml => rl.to_yaml().context("serializing ResourceList")?,
        Output::Json => serde_json::to_string_pretty(&rl).context("serializing ResourceList")? + "\n",
    };
    Ok(out)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let input = read_input(cli.input.as_deref(), max_input_bytes())?;
    let fn_config = match &cli.fn_config {
        Some(p) => Some(std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?),
        None => None,
    };
    let out = process(&input, fn_config.as_deref(), cli.output)?;

    match &cli.out_file {
        Some(p) => std::fs::write(p, out).with_context(|| format!("writing {}", p.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(out.as_bytes()).context("writing stdout")?;
            stdout.flush().context("flushing stdout")?;
        }
    }
    Ok(())
}
