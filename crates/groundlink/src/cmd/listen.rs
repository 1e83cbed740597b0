use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use groundlink::limits::LimitsTransition;
use groundlink::packet::Packet;
use groundlink::task::TaskRunner;
use groundlink::{GroundContext, LinkThread};

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{ground_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_packet, OutputFormat, PacketReport};

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let reconnect_delay = parse_duration(&args.reconnect_delay)?;
    let station = args.station.load()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;
    let runner = TaskRunner::new(runtime.handle().clone());

    let interface = station
        .interface(&args.interface)
        .map_err(|err| ground_error("interface setup failed", err))?
        .ok_or_else(|| CliError::new(USAGE, format!("unknown interface: {}", args.interface)))?
        .with_runner(runner.clone());
    let context = Arc::new(
        GroundContext::new(Arc::clone(&station.commands), Arc::clone(&station.telemetry))
            .with_runner(runner),
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel();
    let observer_context = Arc::clone(&context);
    let link = LinkThread::builder(interface, Arc::clone(&context))
        .reconnect_delay(reconnect_delay)
        .observer(move |packet: &Packet, transitions: &[LimitsTransition]| {
            let mut packet = packet.clone();
            let report = PacketReport::new(&mut packet, &observer_context, transitions);
            let _ = tx.send(report);
        })
        .spawn()
        .map_err(|err| ground_error("link start failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(STOP_CHECK_INTERVAL) {
            Ok(report) => {
                print_packet(&report, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    link.stop();
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
