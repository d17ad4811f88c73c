//! Error catcher lifecycle
//!
//! [`ErrorCatcher`] ties the host's load, round-start and unload signals to
//! the diagnostic subscription and the background log writer. All state shared
//! with the event handler and the writer lives in one [`CaptureContext`] owned
//! by the catcher, so independent catchers never interfere.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{CaptureError, Result};
use crate::filter::should_capture;
use crate::logging::{
    cleanup_old_logs, spawn_writer, LogRotator, PendingBuffer, WriterHandle, WriterOptions,
};
use crate::record::{ErrorRecord, Severity};
use crate::session::{RoundTracker, RoundTransition};
use crate::source::{ConsoleSink, DiagnosticHandler, DiagnosticSource, SubscriptionId};

/// State shared between the event handler, the round signal and the writer
#[derive(Debug, Default)]
pub struct CaptureContext {
    /// Records waiting to be written
    pub buffer: PendingBuffer,
    /// Round lifecycle, including the pending-rotation edge
    pub round: RoundTracker,
}

impl CaptureContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Captures engine errors for one host instance
pub struct ErrorCatcher {
    config: Config,
    log_dir: PathBuf,
    source: Arc<dyn DiagnosticSource>,
    console: Arc<dyn ConsoleSink>,
    context: Arc<CaptureContext>,
    writer_options: WriterOptions,
    subscription: Option<SubscriptionId>,
    writer: Option<WriterHandle>,
    runtime: Option<Handle>,
    file_logging_active: bool,
    loaded: bool,
}

impl ErrorCatcher {
    /// Create a catcher writing round files into `log_dir`
    ///
    /// Nothing happens until [`load`](Self::load) is called.
    pub fn new(
        config: Config,
        log_dir: impl Into<PathBuf>,
        source: Arc<dyn DiagnosticSource>,
        console: Arc<dyn ConsoleSink>,
    ) -> Self {
        Self {
            config,
            log_dir: log_dir.into(),
            source,
            console,
            context: Arc::new(CaptureContext::new()),
            writer_options: WriterOptions::default(),
            subscription: None,
            writer: None,
            runtime: None,
            file_logging_active: false,
            loaded: false,
        }
    }

    /// Override the writer's drain interval
    pub fn with_writer_options(mut self, options: WriterOptions) -> Self {
        self.writer_options = options;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Shared capture state
    pub fn context(&self) -> &Arc<CaptureContext> {
        &self.context
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether the first round has started since load
    pub fn is_initialized(&self) -> bool {
        self.context.round.is_active()
    }

    /// Whether captured errors are being persisted this run
    ///
    /// False when disabled in config or when the log directory could not be
    /// prepared at load.
    pub fn file_logging_active(&self) -> bool {
        self.file_logging_active
    }

    pub fn is_writer_running(&self) -> bool {
        self.writer.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Handle the host's load signal
    ///
    /// Prepares the log directory when file logging is enabled and subscribes
    /// to diagnostics. Failures disable file logging for this run and are
    /// reported, never returned.
    pub fn load(&mut self) {
        if self.loaded {
            warn!("Error catcher already loaded, ignoring load");
            return;
        }

        self.file_logging_active = false;
        if self.config.file_logging_enabled {
            match self.prepare_file_logging() {
                Ok(runtime) => {
                    self.runtime = Some(runtime);
                    self.file_logging_active = true;
                }
                Err(e) => {
                    error!(
                        "{}; file logging disabled for this run",
                        e.friendly_message()
                    );
                }
            }
        }

        if self.file_logging_active {
            if let Some(days) = self.config.retention_days {
                match cleanup_old_logs(&self.log_dir, days) {
                    Ok(count) if count > 0 => info!("Cleaned up {} old error logs", count),
                    Ok(_) => {}
                    Err(e) => warn!("Failed to clean up old error logs: {:#}", e),
                }
            }
        }

        self.context.buffer.reopen();
        let handler = capture_handler(
            Arc::clone(&self.context),
            Arc::clone(&self.console),
            self.config.console_logging_enabled,
            self.file_logging_active,
        );
        self.subscription = Some(self.source.subscribe(handler));
        self.loaded = true;

        info!(
            console = self.config.console_logging_enabled,
            file = self.file_logging_active,
            "Error catcher loaded"
        );
    }

    fn prepare_file_logging(&self) -> Result<Handle> {
        std::fs::create_dir_all(&self.log_dir).map_err(|source| CaptureError::CreateDir {
            path: self.log_dir.clone(),
            source,
        })?;

        Handle::try_current().map_err(|_| CaptureError::NoRuntime)
    }

    /// Handle the host's round-start signal
    ///
    /// The first round after load starts the writer; later rounds make it
    /// rotate to a new file.
    pub fn on_round_started(&mut self) {
        if !self.loaded {
            debug!("Round started before load, ignoring");
            return;
        }

        match self.context.round.begin_round() {
            RoundTransition::Activated => {
                info!("First round started, error capture active");
                self.start_writer();
            }
            RoundTransition::RotationRequested => {
                debug!("New round started, error log will rotate");
            }
        }
    }

    fn start_writer(&mut self) {
        if !self.file_logging_active || self.writer.is_some() {
            return;
        }

        if let Some(runtime) = &self.runtime {
            self.writer = Some(spawn_writer(
                runtime,
                Arc::clone(&self.context),
                self.log_dir.clone(),
                self.writer_options,
            ));
        }
    }

    /// Handle the host's unload signal
    ///
    /// Returns once the writer has written everything captured so far and
    /// closed its file. Safe to call without, or after a failed, load.
    ///
    /// A delivery already in flight when the handler is unsubscribed either
    /// lands in the buffer before it closes, and is written by the final pass,
    /// or is dropped. It is never left behind in the buffer.
    pub async fn unload(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.source.unsubscribe(id);
        }
        self.context.buffer.close();

        if let Some(writer) = self.writer.take() {
            writer.shutdown().await;
        } else if self.file_logging_active && !self.context.buffer.is_empty() {
            // No round ever started, so no writer: flush what was captured
            let mut rotator = LogRotator::new(&self.log_dir);
            rotator.run_cycle(&self.context);
            if let Err(e) = rotator.close() {
                error!("{}", e.friendly_message());
            }
        }

        self.context.round.reset();
        self.file_logging_active = false;
        self.runtime = None;

        if self.loaded {
            self.loaded = false;
            info!("Error catcher unloaded");
        }
    }
}

impl Drop for ErrorCatcher {
    fn drop(&mut self) {
        // Dropping the writer handle stops the task; the handler must go too
        if let Some(id) = self.subscription.take() {
            self.source.unsubscribe(id);
        }
    }
}

/// Build the handler registered with the diagnostic source
///
/// Runs on the engine's delivery thread: filtering, a console echo and a
/// buffer append, none of which touch the disk.
fn capture_handler(
    context: Arc<CaptureContext>,
    console: Arc<dyn ConsoleSink>,
    console_enabled: bool,
    file_enabled: bool,
) -> DiagnosticHandler {
    Arc::new(move |message: &str, trace: &str, severity: Severity| {
        if !should_capture(message, trace, severity) {
            return;
        }

        let record = ErrorRecord::new(message, trace, severity);

        if console_enabled {
            console.print_line(&record.header());
            console.print_line(&format!("{}\n{}", record.message, record.trace));
        }

        if file_enabled {
            context.buffer.append(record);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::list_log_files;
    use crate::source::EventHub;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    const FAST: Duration = Duration::from_millis(20);
    const SETTLE: Duration = Duration::from_millis(250);

    #[derive(Default)]
    struct RecordingConsole {
        lines: Mutex<Vec<String>>,
    }

    impl RecordingConsole {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl ConsoleSink for RecordingConsole {
        fn print_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    struct Harness {
        _temp_dir: TempDir,
        log_dir: PathBuf,
        hub: Arc<EventHub>,
        console: Arc<RecordingConsole>,
        catcher: ErrorCatcher,
    }

    fn harness(console_enabled: bool, file_enabled: bool, interval: Duration) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("7777");
        let hub = Arc::new(EventHub::new());
        let console = Arc::new(RecordingConsole::default());

        let config = Config {
            console_logging_enabled: console_enabled,
            file_logging_enabled: file_enabled,
            retention_days: None,
        };

        let catcher = ErrorCatcher::new(
            config,
            &log_dir,
            Arc::clone(&hub) as Arc<dyn DiagnosticSource>,
            Arc::clone(&console) as Arc<dyn ConsoleSink>,
        )
        .with_writer_options(WriterOptions { interval });

        Harness {
            _temp_dir: temp_dir,
            log_dir,
            hub,
            console,
            catcher,
        }
    }

    fn read_logs(dir: &Path) -> Vec<String> {
        list_log_files(dir)
            .unwrap()
            .iter()
            .map(|f| fs::read_to_string(f).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_console_only_echoes_two_lines() {
        let mut h = harness(true, false, FAST);
        h.catcher.load();
        h.catcher.on_round_started();

        h.hub.emit("NullRef", "at Foo.Bar", Severity::Exception);
        tokio::time::sleep(SETTLE).await;
        h.catcher.unload().await;

        assert_eq!(
            h.console.lines(),
            vec![
                "Catched Unity Message of type Exception:".to_string(),
                "NullRef\nat Foo.Bar".to_string(),
            ]
        );
        assert!(!h.catcher.is_writer_running());
        assert!(!h.log_dir.exists());
    }

    #[tokio::test]
    async fn test_file_only_writes_one_block() {
        let mut h = harness(false, true, FAST);
        h.catcher.load();
        assert!(h.catcher.file_logging_active());
        h.catcher.on_round_started();
        assert!(h.catcher.is_writer_running());

        h.hub.emit("Boom", "trace1", Severity::Error);
        tokio::time::sleep(SETTLE).await;

        // Written before unload
        let logs = read_logs(&h.log_dir);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("Catched Unity Message of type Error:\nBoom\ntrace1\n"));
        assert_eq!(logs[0].matches("Catched Unity Message").count(), 1);
        assert!(h.console.lines().is_empty());

        h.catcher.unload().await;
    }

    #[tokio::test]
    async fn test_each_round_gets_its_own_file() {
        let mut h = harness(false, true, FAST);
        h.catcher.load();

        h.catcher.on_round_started();
        h.hub.emit("E1", "", Severity::Error);
        tokio::time::sleep(SETTLE).await;

        h.catcher.on_round_started();
        h.hub.emit("E2", "", Severity::Error);
        tokio::time::sleep(SETTLE).await;

        h.catcher.unload().await;

        let files = list_log_files(&h.log_dir).unwrap();
        assert_eq!(files.len(), 2);

        let logs = read_logs(&h.log_dir);
        let e1: Vec<&String> = logs.iter().filter(|c| c.contains("E1")).collect();
        let e2: Vec<&String> = logs.iter().filter(|c| c.contains("E2")).collect();
        assert_eq!(e1.len(), 1);
        assert_eq!(e2.len(), 1);
        assert!(!e1[0].contains("E2"));
        assert!(!e2[0].contains("E1"));
    }

    #[tokio::test]
    async fn test_round_without_errors_creates_no_file() {
        let mut h = harness(false, true, FAST);
        h.catcher.load();

        h.catcher.on_round_started();
        h.hub.emit("E1", "", Severity::Error);
        tokio::time::sleep(SETTLE).await;

        h.catcher.on_round_started();
        tokio::time::sleep(SETTLE).await;
        h.catcher.unload().await;

        assert_eq!(list_log_files(&h.log_dir).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unload_flushes_pending_records() {
        let mut h = harness(false, true, Duration::from_secs(60));
        h.catcher.load();
        h.catcher.on_round_started();

        // Let the writer's immediate first cycle go by
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.hub.emit("Pending1", "", Severity::Error);
        h.hub.emit("Pending2", "", Severity::Exception);

        h.catcher.unload().await;

        let logs = read_logs(&h.log_dir);
        assert_eq!(logs.len(), 1);
        let first = logs[0].find("Pending1").unwrap();
        let second = logs[0].find("Pending2").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_unload_before_first_round_still_writes() {
        let mut h = harness(false, true, FAST);
        h.catcher.load();

        h.hub.emit("Early", "", Severity::Error);
        assert!(!h.catcher.is_writer_running());

        h.catcher.unload().await;

        let logs = read_logs(&h.log_dir);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("Early"));
    }

    #[tokio::test]
    async fn test_filtered_events_never_surface() {
        let mut h = harness(true, true, FAST);
        h.catcher.load();
        h.catcher.on_round_started();

        h.hub.emit("warn", "", Severity::Warning);
        h.hub.emit("log", "", Severity::Log);
        h.hub.emit("assert", "", Severity::Assert);
        h.hub.emit("Boom", "at ClutterSpawner.Tick()", Severity::Error);
        h.hub.emit("A scripted object is broken", "", Severity::Exception);
        tokio::time::sleep(SETTLE).await;
        h.catcher.unload().await;

        assert!(h.console.lines().is_empty());
        assert!(list_log_files(&h.log_dir).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_console_and_file_both_fire() {
        let mut h = harness(true, true, FAST);
        h.catcher.load();
        h.catcher.on_round_started();

        h.hub.emit("Boom", "trace1", Severity::Error);
        h.catcher.unload().await;

        assert_eq!(h.console.lines().len(), 2);
        let logs = read_logs(&h.log_dir);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("Boom\ntrace1"));
    }

    #[tokio::test]
    async fn test_unload_unsubscribes_and_resets() {
        let mut h = harness(true, true, FAST);
        h.catcher.load();
        h.catcher.on_round_started();
        assert_eq!(h.hub.subscriber_count(), 1);
        assert!(h.catcher.is_initialized());

        h.catcher.unload().await;

        assert_eq!(h.hub.subscriber_count(), 0);
        assert!(!h.catcher.is_loaded());
        assert!(!h.catcher.is_initialized());
        assert!(!h.catcher.is_writer_running());

        h.hub.emit("After", "", Severity::Error);
        assert!(h.console.lines().is_empty());
        assert!(h.catcher.context().buffer.is_empty());
    }

    /// Source that keeps calling handlers after they unsubscribe, like a
    /// delivery that was already in flight when unload ran
    #[derive(Default)]
    struct LingeringSource {
        handlers: Mutex<Vec<DiagnosticHandler>>,
    }

    impl LingeringSource {
        fn emit(&self, message: &str, trace: &str, severity: Severity) {
            let handlers = self.handlers.lock().unwrap().clone();
            for handler in handlers {
                handler(message, trace, severity);
            }
        }
    }

    impl DiagnosticSource for LingeringSource {
        fn subscribe(&self, handler: DiagnosticHandler) -> SubscriptionId {
            let mut handlers = self.handlers.lock().unwrap();
            handlers.push(handler);
            SubscriptionId(handlers.len() as u64)
        }

        fn unsubscribe(&self, _id: SubscriptionId) {}
    }

    #[tokio::test]
    async fn test_late_delivery_after_unload_is_not_stranded() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("7777");
        let source = Arc::new(LingeringSource::default());
        let config = Config {
            console_logging_enabled: false,
            file_logging_enabled: true,
            retention_days: None,
        };
        let mut catcher = ErrorCatcher::new(
            config,
            &log_dir,
            Arc::clone(&source) as Arc<dyn DiagnosticSource>,
            Arc::new(RecordingConsole::default()) as Arc<dyn ConsoleSink>,
        )
        .with_writer_options(WriterOptions { interval: FAST });

        catcher.load();
        catcher.on_round_started();
        source.emit("Before", "", Severity::Error);
        catcher.unload().await;

        source.emit("Late", "", Severity::Error);
        assert!(catcher.context().buffer.is_empty());

        let logs = read_logs(&log_dir).concat();
        assert!(logs.contains("Before"));
        assert!(!logs.contains("Late"));
    }

    #[tokio::test]
    async fn test_reload_after_unload_captures_again() {
        let mut h = harness(false, true, FAST);
        h.catcher.load();
        h.catcher.unload().await;

        h.catcher.load();
        h.catcher.on_round_started();
        h.hub.emit("Again", "", Severity::Error);
        h.catcher.unload().await;

        let logs = read_logs(&h.log_dir).concat();
        assert!(logs.contains("Again"));
    }

    #[tokio::test]
    async fn test_second_load_is_ignored() {
        let mut h = harness(true, false, FAST);
        h.catcher.load();
        h.catcher.load();

        assert_eq!(h.hub.subscriber_count(), 1);
        h.catcher.unload().await;
    }

    #[tokio::test]
    async fn test_unload_without_load_is_safe() {
        let mut h = harness(true, true, FAST);
        h.catcher.unload().await;
        h.catcher.unload().await;
        assert!(!h.catcher.is_loaded());
    }

    #[tokio::test]
    async fn test_round_before_load_is_ignored() {
        let mut h = harness(false, true, FAST);
        h.catcher.on_round_started();
        assert!(!h.catcher.is_initialized());

        h.catcher.load();
        h.catcher.on_round_started();
        assert!(h.catcher.is_initialized());
        assert!(h.catcher.is_writer_running());
        h.catcher.unload().await;
    }

    #[tokio::test]
    async fn test_directory_failure_disables_file_logging() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let hub = Arc::new(EventHub::new());
        let console = Arc::new(RecordingConsole::default());
        let config = Config {
            console_logging_enabled: true,
            file_logging_enabled: true,
            retention_days: None,
        };
        let mut catcher = ErrorCatcher::new(
            config,
            blocker.join("7777"),
            Arc::clone(&hub) as Arc<dyn DiagnosticSource>,
            Arc::clone(&console) as Arc<dyn ConsoleSink>,
        );

        catcher.load();
        assert!(catcher.is_loaded());
        assert!(!catcher.file_logging_active());

        catcher.on_round_started();
        assert!(!catcher.is_writer_running());

        hub.emit("Boom", "", Severity::Error);
        assert_eq!(console.lines().len(), 2);
        assert!(catcher.context().buffer.is_empty());

        catcher.unload().await;
    }

    #[test]
    fn test_load_without_runtime_disables_file_logging() {
        let temp_dir = TempDir::new().unwrap();
        let hub = Arc::new(EventHub::new());
        let config = Config {
            console_logging_enabled: false,
            file_logging_enabled: true,
            retention_days: None,
        };
        let mut catcher = ErrorCatcher::new(
            config,
            temp_dir.path().join("7777"),
            Arc::clone(&hub) as Arc<dyn DiagnosticSource>,
            Arc::new(RecordingConsole::default()) as Arc<dyn ConsoleSink>,
        );

        catcher.load();
        assert!(!catcher.file_logging_active());
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let h = harness(true, false, FAST);
        let hub = Arc::clone(&h.hub);
        let Harness { mut catcher, .. } = h;

        catcher.load();
        assert_eq!(hub.subscriber_count(), 1);

        drop(catcher);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_retention_runs_at_load() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("7777");
        fs::create_dir_all(&log_dir).unwrap();
        let old_log = log_dir.join("Error Log 2020-01-01 00.00.00.txt");
        fs::write(&old_log, b"old").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let config = Config {
            console_logging_enabled: false,
            file_logging_enabled: true,
            retention_days: Some(0),
        };
        let mut catcher = ErrorCatcher::new(
            config,
            &log_dir,
            Arc::new(EventHub::new()) as Arc<dyn DiagnosticSource>,
            Arc::new(RecordingConsole::default()) as Arc<dyn ConsoleSink>,
        );

        catcher.load();
        assert!(!old_log.exists());
        catcher.unload().await;
    }

    #[tokio::test]
    async fn test_load_with_huge_retention_keeps_logs() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("7777");
        fs::create_dir_all(&log_dir).unwrap();
        let old_log = log_dir.join("Error Log 2020-01-01 00.00.00.txt");
        fs::write(&old_log, b"old").unwrap();

        let config: Config =
            toml::from_str("file_logging_enabled = true\nretention_days = 300000000000000\n")
                .unwrap();
        let mut catcher = ErrorCatcher::new(
            config,
            &log_dir,
            Arc::new(EventHub::new()) as Arc<dyn DiagnosticSource>,
            Arc::new(RecordingConsole::default()) as Arc<dyn ConsoleSink>,
        );

        catcher.load();
        assert!(catcher.file_logging_active());
        assert!(old_log.exists());
        catcher.unload().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_delivery_writes_every_error_once() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 250;

        let mut h = harness(false, true, FAST);
        h.catcher.load();
        h.catcher.on_round_started();

        let emitters: Vec<_> = (0..THREADS)
            .map(|t| {
                let hub = Arc::clone(&h.hub);
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        hub.emit(&format!("err-{}-{}", t, i), "", Severity::Error);
                    }
                })
            })
            .collect();
        for emitter in emitters {
            emitter.join().unwrap();
        }

        h.catcher.unload().await;

        let logs = read_logs(&h.log_dir);
        let all = logs.concat();
        assert_eq!(
            all.matches("Catched Unity Message of type Error:").count(),
            THREADS * PER_THREAD
        );
        for t in 0..THREADS {
            assert!(all.contains(&format!("err-{}-{}\n", t, PER_THREAD - 1)));
        }
    }
}
