use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use error_catcher::config::{self, Config};
use error_catcher::logging;
use error_catcher::source::{ConsoleSink, DiagnosticSource, EventHub, TracingConsole};
use error_catcher::{ErrorCatcher, Severity};

/// Instance id used when none is given on the command line
const DEFAULT_INSTANCE_ID: &str = "7777";

/// Host harness: drives one catcher from stdin
///
/// Each line is either `round` (new round) or `<severity>|<message>|<trace>`.
/// Message and trace may use `\n` escapes. EOF unloads and exits.
#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing()?;

    let instance_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_INSTANCE_ID.to_string());

    let config = Config::load().context("Failed to load configuration")?;
    let log_dir = config::instance_log_dir(&config::config_dir(), &instance_id);

    let hub = Arc::new(EventHub::new());
    let mut catcher = ErrorCatcher::new(
        config,
        log_dir,
        Arc::clone(&hub) as Arc<dyn DiagnosticSource>,
        Arc::new(TracingConsole) as Arc<dyn ConsoleSink>,
    );

    catcher.load();
    tracing::info!(
        "Error catcher for instance {} writing to {}",
        instance_id,
        catcher.log_dir().display()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if line == "round" {
            catcher.on_round_started();
            continue;
        }

        let mut parts = line.splitn(3, '|');
        let severity = Severity::from(parts.next().unwrap_or_default());
        let message = unescape(parts.next().unwrap_or_default());
        let trace = unescape(parts.next().unwrap_or_default());
        hub.emit(&message, &trace, severity);
    }

    catcher.unload().await;
    Ok(())
}

fn unescape(field: &str) -> String {
    field.replace("\\n", "\n")
}
