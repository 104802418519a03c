use crate::bridge::{BackgroundEvent, UiCommand};
use crate::config::Config;
use crate::gmail::MailGateway;
use crate::state::AppState;
use crate::ui::{dashboard, sidebar};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub struct GmailPurgeApp {
    state: AppState,
    cmd_tx: UnboundedSender<UiCommand>,
    event_rx: std::sync::mpsc::Receiver<BackgroundEvent>,
}

impl GmailPurgeApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: &Config,
        gateway: Arc<dyn MailGateway>,
    ) -> Self {
        let bridge = crate::bridge::setup_bridge(cc.egui_ctx.clone(), config, gateway);
        Self {
            state: AppState::new(&config.default_query),
            cmd_tx: bridge.cmd_tx,
            event_rx: bridge.event_rx,
        }
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.state.apply(event);
            ctx.request_repaint();
        }
    }
}

impl eframe::App for GmailPurgeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events(ctx);

        egui::SidePanel::left("sidebar")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    sidebar::draw_sidebar(ui, &mut self.state, &self.cmd_tx);
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            dashboard::draw_dashboard(ui, &self.state, &self.cmd_tx);
        });
    }
}
