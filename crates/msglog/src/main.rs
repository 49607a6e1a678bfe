//! Message Log Simulator
//!
//! Runs one record/playback session against a simulated software bus:
//! loads the table, logs headers of the selected message id from a synthetic
//! message stream, then plays the log file back on the scheduler tick and
//! prints every playback packet as a JSON line.
//!
//! Usage:
//!   msglog-sim --table msglog_tbl.json --msg-id 0x0801 --messages 40 \
//!              --tick-ms 250 --dump msglog_tbl_dump.json

use anyhow::{Context, Result};
use clap::Parser;
use msglog::{ChildFuncStatus, MsgId, MsgLog, MsgLogError, PlaybkPkt, Transport};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Message ids on the simulated bus
const SIM_MSG_IDS: [MsgId; 3] = [0x0801, 0x0802, 0x0803];

#[derive(Parser, Debug)]
#[command(
    name = "msglog-sim",
    about = "Record message headers and play them back as telemetry"
)]
struct Args {
    /// Message Log table (JSON). Without it a default table is loaded.
    #[arg(short, long, env = "MSGLOG_TABLE")]
    table: Option<PathBuf>,

    /// Directory for log files when no table is given
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Message id to log (decimal or 0x-prefixed hex)
    #[arg(short, long, default_value = "0x0801", value_parser = parse_msg_id)]
    msg_id: MsgId,

    /// Messages to put on the simulated bus
    #[arg(short = 'n', long, default_value_t = 30)]
    messages: u16,

    /// Scheduler tick period in milliseconds
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Dump the table here when the session ends
    #[arg(short, long)]
    dump: Option<PathBuf>,

    /// App name written into table dumps
    #[arg(long, default_value = "MSGLOG")]
    app_name: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_msg_id(s: &str) -> std::result::Result<MsgId, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => MsgId::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid message id {s:?}: {e}"))
}

/// Bus that forwards playback packets to the printer task
struct ChannelTransport {
    subscriptions: BTreeSet<MsgId>,
    tx: mpsc::UnboundedSender<PlaybkPkt>,
}

impl ChannelTransport {
    fn new(tx: mpsc::UnboundedSender<PlaybkPkt>) -> Self {
        Self {
            subscriptions: BTreeSet::new(),
            tx,
        }
    }

    fn is_subscribed(&self, msg_id: MsgId) -> bool {
        self.subscriptions.contains(&msg_id)
    }
}

impl Transport for ChannelTransport {
    fn subscribe(&mut self, msg_id: MsgId) -> msglog::Result<()> {
        self.subscriptions.insert(msg_id);
        Ok(())
    }

    fn unsubscribe(&mut self, msg_id: MsgId) -> msglog::Result<()> {
        self.subscriptions.remove(&msg_id);
        Ok(())
    }

    fn publish(&mut self, pkt: PlaybkPkt) -> msglog::Result<()> {
        self.tx
            .send(pkt)
            .map_err(|e| MsgLogError::Transport(e.to_string()))
    }
}

/// CCSDS-style primary header followed by a coarse time stamp
fn sim_header(msg_id: MsgId, seq: u16, secs: u32) -> [u8; 16] {
    let mut hdr = [0u8; 16];
    hdr[0..2].copy_from_slice(&msg_id.to_be_bytes());
    hdr[2..4].copy_from_slice(&(0xC000 | (seq & 0x3FFF)).to_be_bytes());
    hdr[4..6].copy_from_slice(&9u16.to_be_bytes());
    hdr[6..10].copy_from_slice(&secs.to_be_bytes());
    hdr
}

fn default_table(log_dir: &std::path::Path) -> Result<String> {
    let base = log_dir.join("msglog_");
    let base = base
        .to_str()
        .context("log directory is not valid UTF-8")?;
    let tbl = serde_json::json!({
        "file": {
            "path-base-name": base,
            "extension": ".txt",
            "entry-cnt": 10
        },
        "playbk-delay": 2
    });
    Ok(tbl.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "msglog=debug,msglog_sim=debug"
    } else {
        "msglog=info,msglog_sim=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut msglog = MsgLog::new(args.app_name.clone(), ChannelTransport::new(tx));

    match &args.table {
        Some(path) => {
            msglog.load_tbl(path)?;
        }
        None => {
            let text = default_table(&args.log_dir)?;
            msglog.table_mut().load_str(&text)?;
        }
    }

    // Record
    msglog.start_log(args.msg_id)?;
    for n in 0..args.messages {
        let msg_id = SIM_MSG_IDS[usize::from(n) % SIM_MSG_IDS.len()];
        if !msglog.transport().is_subscribed(msg_id) {
            continue;
        }
        let hdr = sim_header(msg_id, n, u32::from(n) * 10);
        msglog.on_message(msg_id, &hdr)?;
    }
    match msglog.stop_log() {
        Ok(entries) => info!("Recorded {} entries", entries),
        Err(e) if e.is_benign() => info!("Logging already stopped by the entry limit"),
        Err(e) => return Err(e.into()),
    }

    // Play back
    msglog.start_playbk()?;
    let mut ticker = time::interval(Duration::from_millis(args.tick_ms.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = msglog.run_child_func()?;
                while let Ok(pkt) = rx.try_recv() {
                    println!("{}", serde_json::to_string(&pkt)?);
                }
                if let ChildFuncStatus::Completed(sent) = status {
                    info!("Playback finished, {} packets", sent);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping playback");
                msglog.stop_playbk()?;
                break;
            }
        }
    }

    if let Some(path) = &args.dump {
        msglog.dump_tbl(path)?;
    }

    let status = msglog.status();
    info!(
        "{} final status: {}",
        msglog.table().app_name(),
        serde_json::to_string(&status)?
    );

    Ok(())
}
