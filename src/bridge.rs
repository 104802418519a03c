use crate::config::Config;
use crate::engine::progress::{ProgressEvent, ProgressSink};
use crate::gmail::MailGateway;
use crate::scheduler::{self, JobRequest, Rejection, SchedulerHandle, StartReply};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{info, warn};

#[derive(Debug)]
pub enum UiCommand {
    Start(JobRequest),
    Stop,
}

#[derive(Debug)]
pub enum BackgroundEvent {
    Progress(ProgressEvent),
    Rejected(Rejection),
}

#[derive(Debug)]
pub struct BridgeChannels {
    pub cmd_tx: tokio_mpsc::UnboundedSender<UiCommand>,
    pub event_rx: std_mpsc::Receiver<BackgroundEvent>,
}

/// Delivers background events to the UI thread and wakes it up.
#[derive(Debug, Clone)]
struct UiSink {
    tx: std_mpsc::Sender<BackgroundEvent>,
    ctx: egui::Context,
}

impl UiSink {
    fn send(&self, event: BackgroundEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("Failed to send event to UI: {}", e);
        }
        self.ctx.request_repaint();
    }
}

impl ProgressSink for UiSink {
    fn notify(&self, event: ProgressEvent) {
        self.send(BackgroundEvent::Progress(event));
    }
}

pub fn setup_bridge(
    ctx: egui::Context,
    config: &Config,
    gateway: Arc<dyn MailGateway>,
) -> BridgeChannels {
    let (cmd_tx, cmd_rx) = tokio_mpsc::unbounded_channel::<UiCommand>();
    let (event_tx, event_rx) = std_mpsc::channel::<BackgroundEvent>();
    let sink = UiSink { tx: event_tx, ctx };
    let engine_settings = config.engine.clone();
    let quota = config.quota;

    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
        rt.block_on(async move {
            let handle = scheduler::spawn(gateway, Arc::new(sink.clone()), engine_settings, quota);
            background_loop(cmd_rx, handle, sink).await;
        });
    });

    BridgeChannels { cmd_tx, event_rx }
}

async fn background_loop(
    mut cmd_rx: tokio_mpsc::UnboundedReceiver<UiCommand>,
    handle: SchedulerHandle,
    sink: UiSink,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            UiCommand::Start(request) => {
                let handle = handle.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    if let StartReply::Rejected(rejection) = handle.start(request).await {
                        info!("Start rejected: {}", rejection.message);
                        sink.send(BackgroundEvent::Rejected(rejection));
                    }
                });
            }
            UiCommand::Stop => handle.stop(),
        }
    }
    info!("UI closed, stopping background work");
    handle.stop();
    if let Some(snapshot) = handle.status().await {
        info!(
            "Last job {:?} ({:?}): {} emails deleted",
            snapshot.query, snapshot.status, snapshot.deleted_count
        );
    }
}
