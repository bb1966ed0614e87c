//! Reader simulator.
//!
//! Runs the full access pipeline against a mock edge source fed from stdin.
//!
//! ```text
//! doorman <settings.json> <tokens.json>
//!
//! card <HEX-UID>        present a card to the configured reader
//! frame <bits> <value>  send a raw frame (value in decimal, 0x.. or 0b..)
//! key <keys>            type keys, e.g. `key #1234#`
//! reload [clear]        reload the token file, optionally clearing lockouts
//! status                show lockout and keypad state
//! quit
//! ```
//!
//! Set `RUST_LOG` to control log output (default `info`).

use anyhow::{Context, Result, bail};
use doorman_access::{AccessController, Decision, TaskTermination, TokenTable};
use doorman_core::{BitFrame, PipelineConfig, Settings};
use doorman_keypad::Key;
use doorman_wiegand::{MockEdgeSource, MockEdgeSourceHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Pause between simulated key presses. Slower than the overspeed limit.
const KEY_SPACING: Duration = Duration::from_millis(250);

type Controller = AccessController<mpsc::UnboundedSender<Decision>>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(settings_path), Some(tokens_path)) = (args.next(), args.next()) else {
        bail!("usage: doorman <settings.json> <tokens.json>");
    };
    let tokens_path = PathBuf::from(tokens_path);

    let config = load_settings(Path::new(&settings_path))?;
    let table = load_tokens(&tokens_path, &config)?;
    info!(
        credentials = table.len(),
        card_bits = config.card_bits,
        delimiter = %config.delimiter,
        "doorman simulator starting"
    );

    let (tx, mut decisions) = mpsc::unbounded_channel();
    let controller = Arc::new(AccessController::new(config, tx)?.with_credentials(table));
    let (source, edges) = MockEdgeSource::with_name("stdin");
    let task = Arc::clone(&controller).spawn(source);

    let printer = tokio::spawn(async move {
        while let Some(decision) = decisions.recv().await {
            println!("{decision}  [{}]", decision.attempt_id);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        if let Err(e) = execute(line, &controller, &edges, &tokens_path).await {
            eprintln!("error: {e:#}");
        }
    }

    drop(edges);
    if task.join().await != TaskTermination::Finished {
        bail!("access controller did not stop cleanly");
    }
    drop(controller);
    printer.await.context("decision printer")?;
    Ok(())
}

async fn execute(
    line: &str,
    controller: &Controller,
    edges: &MockEdgeSourceHandle,
    tokens_path: &Path,
) -> Result<()> {
    let gap = controller.config().bit_gap * 2;
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();

    match command {
        "card" => {
            let uid = words.next().context("card needs a hex UID")?.replace(':', "");
            let bits = controller.config().card_bits;
            let frame = controller
                .canonicalizer()
                .encode(bits, &uid.to_ascii_uppercase())
                .with_context(|| format!("{uid} does not fit a {bits}-bit frame"))?;
            edges.send_frame(frame).await?;
            tokio::time::sleep(gap).await;
        }
        "frame" => {
            let bits: u32 = words
                .next()
                .context("frame needs a bit count")?
                .parse()
                .context("bit count")?;
            let value = parse_value(words.next().context("frame needs a value")?)?;
            edges.send_frame(BitFrame::new(bits, value)).await?;
            tokio::time::sleep(gap).await;
        }
        "key" => {
            let keys = words.next().context("key needs at least one key")?;
            for c in keys.chars() {
                let key = Key::from_char(c).with_context(|| format!("no key labelled {c:?}"))?;
                edges.send_keystroke(key.code() as u8).await?;
                tokio::time::sleep(KEY_SPACING).await;
            }
        }
        "reload" => {
            let clear = matches!(words.next(), Some("clear"));
            let table = load_tokens(tokens_path, controller.config())?;
            controller.reload(table, clear).await;
        }
        "status" => {
            println!("lockout: {:?}", controller.lockout().state().await);
            match controller.keypad_deadline().await {
                Some(_) => println!("keypad: code in progress"),
                None => println!("keypad: idle"),
            }
        }
        other => bail!("unknown command {other:?}"),
    }
    Ok(())
}

fn load_settings(path: &Path) -> Result<PipelineConfig> {
    let config = Settings::from_path(path)
        .and_then(Settings::into_config)
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(config)
}

fn load_tokens(path: &Path, config: &PipelineConfig) -> Result<TokenTable> {
    TokenTable::from_path(path, config)
        .with_context(|| format!("invalid token list in {}", path.display()))
}

fn parse_value(text: &str) -> Result<u64> {
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else {
        text.parse()
    };
    parsed.with_context(|| format!("{text:?} is not a number"))
}
