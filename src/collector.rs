use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Config, SINK_QUEUE_CAPACITY};
use crate::error::{AppError, Result};
use crate::ingest::{bind_socket, Receiver};
use crate::scheduler::{Flusher, WindowScheduler};
use crate::sink::{CsvFileSink, RecordSink, SinkWriter};
use crate::state::CollectorState;
use crate::types::{local_label, ShutdownReport};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// State initialized, sink open, port bound.
    Starting,
    /// Receiver and scheduler live.
    Running,
    /// Stop flag set; waiting for loops, then one forced flush.
    Draining,
    /// Terminal. Report produced, sink released.
    Stopped,
}

impl Phase {
    pub fn successor(self) -> Option<Phase> {
        match self {
            Phase::Starting => Some(Phase::Running),
            Phase::Running => Some(Phase::Draining),
            Phase::Draining => Some(Phase::Stopped),
            Phase::Stopped => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Draining => "draining",
            Phase::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

fn advance(phase: &mut Phase) {
    if let Some(next) = phase.successor() {
        info!(from = %phase, to = %next, "Collector {next}");
        *phase = next;
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Foreground latency collector. Built in `Starting`, consumed by `run`.
pub struct Collector {
    config: Config,
    state: Arc<CollectorState>,
    flusher: Arc<Flusher>,
    receiver: Receiver,
    writer: SinkWriter,
    sink_location: String,
    phase: Phase,
}

impl Collector {
    /// Create the CSV sink at `config.output` and bind the listening port.
    pub fn start(config: Config) -> Result<Self> {
        Self::build(config, |cfg| {
            let sink: Box<dyn RecordSink> = Box::new(CsvFileSink::create(&cfg.output)?);
            Ok(sink)
        })
    }

    /// Like `start`, with a caller-supplied sink.
    pub fn with_sink(config: Config, sink: Box<dyn RecordSink>) -> Result<Self> {
        Self::build(config, move |_| Ok(sink))
    }

    /// Validates before the sink is opened, so a bad config touches nothing.
    fn build<F>(config: Config, open_sink: F) -> Result<Self>
    where
        F: FnOnce(&Config) -> Result<Box<dyn RecordSink>>,
    {
        config.validate()?;
        let sink = open_sink(&config)?;
        let sink_location = sink.location();

        let state = CollectorState::new(SystemTime::now());
        let (records_tx, records_rx) = mpsc::channel(SINK_QUEUE_CAPACITY);
        let flusher = Arc::new(Flusher::new(Arc::clone(&state), records_tx));
        let writer = SinkWriter::new(sink, records_rx, Arc::clone(&state));

        let addr = SocketAddr::new(config.bind_ip, config.port);
        let socket = bind_socket(addr, config.recv_buffer_bytes)?;
        let receiver = Receiver::new(socket, Arc::clone(&state), config.recv_timeout);

        Ok(Self {
            config,
            state,
            flusher,
            receiver,
            writer,
            sink_location,
            phase: Phase::Starting,
        })
    }

    /// Actual bound address; differs from the config when port 0 was requested.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.receiver.local_addr()?)
    }

    #[cfg(test)]
    fn state(&self) -> Arc<CollectorState> {
        Arc::clone(&self.state)
    }

    /// Run until `shutdown` resolves, then drain and report.
    ///
    /// The receiver and scheduler get `Config::shutdown_grace` to notice the
    /// stop flag; a loop that overruns is aborted. Exactly one forced flush
    /// follows, so the partial window is never lost.
    pub async fn run<F>(self, shutdown: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        let Collector {
            config,
            state,
            flusher,
            receiver,
            writer,
            sink_location,
            mut phase,
        } = self;

        let writer_task = tokio::task::spawn_blocking(move || writer.run());
        let scheduler = WindowScheduler::new(Arc::clone(&state), Arc::clone(&flusher), config.window);
        let receiver_task = tokio::spawn(receiver.run());
        let scheduler_task = tokio::spawn(scheduler.run());
        advance(&mut phase);

        shutdown.await;

        advance(&mut phase);
        state.stop();
        let (pending, since) = state.live_window();
        info!(pending, "Shutting down gracefully, partial window open since {}", local_label(since));

        let grace = config.shutdown_grace();
        for (name, task) in [("receiver", receiver_task), ("scheduler", scheduler_task)] {
            if let Err(e) = join_within(task, grace, name).await {
                error!("{name} task failed: {e}");
            }
        }

        if flusher.flush().is_none() {
            info!("Final window empty, nothing to flush");
        }

        // The writer drains whatever is still queued, then closes the sink.
        flusher.close_records();
        if let Err(e) = writer_task.await {
            error!("sink writer task failed: {e}");
        }
        advance(&mut phase);

        Ok(ShutdownReport {
            total_requests: state.total_requests(),
            total_windows: state.total_windows(),
            sink_failures: state.sink_failures(),
            sink_location,
            lifetime: flusher.lifetime().snapshot(),
        })
    }
}

/// Await a task for at most `grace`; abort it if it overruns.
async fn join_within(task: JoinHandle<()>, grace: Duration, name: &str) -> Result<()> {
    let abort = task.abort_handle();
    match tokio::time::timeout(grace, task).await {
        Ok(joined) => joined.map_err(AppError::from),
        Err(_) => {
            warn!("{name} did not stop within {grace:?}, aborting");
            abort.abort();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::MemorySink;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::UdpSocket;
    use tokio::sync::oneshot;

    fn test_config(window: Duration) -> Config {
        Config {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            window,
            recv_timeout: Duration::from_millis(100),
            recv_buffer_bytes: 256 * 1024,
            ..Config::default()
        }
    }

    async fn send_all(to: SocketAddr, values: &[&str]) {
        let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        for v in values {
            sender.send_to(v.as_bytes(), to).await.unwrap();
        }
    }

    #[test]
    fn phases_advance_in_order() {
        let mut phase = Phase::Starting;
        let mut seen = vec![phase];
        while phase.successor().is_some() {
            advance(&mut phase);
            seen.push(phase);
        }
        assert_eq!(seen, vec![Phase::Starting, Phase::Running, Phase::Draining, Phase::Stopped]);
        advance(&mut phase);
        assert_eq!(phase, Phase::Stopped);
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let taken = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let config = Config {
            port: taken.local_addr().unwrap().port(),
            ..test_config(Duration::from_secs(5))
        };
        match Collector::with_sink(config, Box::new(MemorySink::new())) {
            Err(AppError::Bind { .. }) => {}
            Err(e) => panic!("expected Bind error, got {e}"),
            Ok(_) => panic!("bind should have failed"),
        }
    }

    #[tokio::test]
    async fn zero_window_is_rejected_before_binding() {
        let config = test_config(Duration::ZERO);
        assert!(matches!(
            Collector::with_sink(config, Box::new(MemorySink::new())),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn one_second_window_writes_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("latencies.csv");
        let config = Config {
            output: output.clone(),
            ..test_config(Duration::from_secs(1))
        };

        let collector = Collector::start(config).unwrap();
        let addr = collector.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(collector.run(async {
            let _ = stop_rx.await;
        }));

        send_all(addr, &["10.0", "20.0", "30.0"]).await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let contents = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2, "header plus one window row: {contents}");
        let cols: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(cols[4], "3");
        assert_eq!(cols[6], "20.000");
        assert_eq!(cols[7], "10.000");
        assert_eq!(cols[12], "30.000");

        stop_tx.send(()).unwrap();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.total_requests, 3);
        assert_eq!(report.total_windows, 1);
        assert_eq!(report.sink_failures, 0);
        assert_eq!(report.sink_location, output.display().to_string());

        // Nothing arrived after the first window, so shutdown adds no row.
        let contents = std::fs::read_to_string(&output).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn bad_config_does_not_touch_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("never.csv");
        let config = Config {
            output: output.clone(),
            ..test_config(Duration::ZERO)
        };
        assert!(matches!(Collector::start(config), Err(AppError::Config(_))));
        assert!(!output.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_flushes_partial_window() {
        let sink = MemorySink::new();
        let collector =
            Collector::with_sink(test_config(Duration::from_secs(60)), Box::new(sink.clone())).unwrap();
        let addr = collector.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(collector.run(async {
            let _ = stop_rx.await;
        }));

        send_all(addr, &["5", "15", "bogus", "25"]).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        stop_tx.send(()).unwrap();
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.total_requests, 3);
        assert_eq!(report.total_windows, 1);
        let rows = sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[0].mean_ms, 15.0);
        assert_eq!(report.lifetime.unwrap().samples, 3);
    }

    /// Sink whose append blocks its thread, like a stalled disk.
    struct SlowSink {
        delay: Duration,
        rows: MemorySink,
    }

    impl RecordSink for SlowSink {
        fn append(&mut self, summary: &crate::types::WindowSummary) -> Result<()> {
            std::thread::sleep(self.delay);
            self.rows.append(summary)
        }

        fn location(&self) -> String {
            "slow".to_string()
        }
    }

    // Single-threaded runtime: a write on the async worker would freeze the receiver.
    #[tokio::test]
    async fn slow_sink_does_not_stall_receiver() {
        let rows = MemorySink::new();
        let sink = SlowSink {
            delay: Duration::from_millis(1_500),
            rows: rows.clone(),
        };
        let collector = Collector::with_sink(test_config(Duration::from_secs(1)), Box::new(sink)).unwrap();
        let addr = collector.local_addr().unwrap();
        let state = collector.state();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(collector.run(async {
            let _ = stop_rx.await;
        }));

        send_all(addr, &["10"]).await;
        // First window closes at 1 s; its append holds the sink until about 2.5 s.
        tokio::time::sleep(Duration::from_millis(1_300)).await;
        assert_eq!(state.total_windows(), 1);

        send_all(addr, &["20"]).await;
        let sent = std::time::Instant::now();
        while state.total_requests() < 2 {
            assert!(
                sent.elapsed() < Duration::from_millis(500),
                "datagram not recorded while the sink was busy"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(rows.rows().is_empty(), "first append should still be in progress");

        stop_tx.send(()).unwrap();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.total_requests, 2);
        assert_eq!(report.total_windows, 2);
        assert_eq!(report.sink_failures, 0);
        assert_eq!(rows.rows().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn idle_shutdown_reports_zero() {
        let sink = MemorySink::new();
        let collector =
            Collector::with_sink(test_config(Duration::from_secs(60)), Box::new(sink.clone())).unwrap();
        let report = collector.run(async {}).await.unwrap();

        assert_eq!(report.total_requests, 0);
        assert_eq!(report.total_windows, 0);
        assert!(report.lifetime.is_none());
        assert!(sink.rows().is_empty());
    }
}
