use crate::bridge::UiCommand;
use crate::state::{AppPhase, AppState};
use egui::Ui;
use tokio::sync::mpsc::UnboundedSender;

pub fn draw_dashboard(ui: &mut Ui, state: &AppState, cmd_tx: &UnboundedSender<UiCommand>) {
    // Error display
    if let Some(err) = &state.error_message {
        ui.colored_label(egui::Color32::RED, format!("Error: {}", err));
        if let Some(hint) = state.retry_hint() {
            ui.label(hint);
        }
        ui.add_space(4.0);
    }

    match state.phase {
        AppPhase::Starting => {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.heading("Starting...");
            });
        }
        AppPhase::Running | AppPhase::Stopping => {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.heading(if state.phase == AppPhase::Stopping {
                    "Stopping..."
                } else {
                    "Deleting..."
                });
            });
            ui.label(&state.active_query);
            if ui
                .add_enabled(state.phase == AppPhase::Running, egui::Button::new("Stop"))
                .clicked()
            {
                let _ = cmd_tx.send(UiCommand::Stop);
            }
            ui.add_space(8.0);
        }
        AppPhase::Idle => {}
    }

    if state.phase == AppPhase::Idle && state.last_summary.is_none() && state.batches.is_empty() {
        ui.centered_and_justified(|ui| {
            ui.label("Enter a Gmail search query and click Delete Emails to begin.");
        });
        return;
    }

    // Metrics row
    ui.horizontal(|ui| {
        let frame = egui::Frame::default()
            .inner_margin(8.0)
            .corner_radius(4.0)
            .fill(ui.visuals().faint_bg_color);

        frame.show(ui, |ui| {
            ui.vertical(|ui| {
                ui.label("Emails Deleted");
                ui.heading(state.deleted_total.to_string());
            });
        });

        frame.show(ui, |ui| {
            ui.vertical(|ui| {
                ui.label("Batches");
                ui.heading(state.batches.len().to_string());
            });
        });

        if let Some(summary) = &state.last_summary {
            frame.show(ui, |ui| {
                ui.vertical(|ui| {
                    ui.label("Pages");
                    ui.heading(summary.pages.to_string());
                });
            });
        }
    });

    ui.add_space(4.0);
    ui.label(&state.status_message);

    ui.add_space(8.0);
    ui.separator();
    ui.add_space(4.0);

    draw_batch_log(ui, state);
}

fn draw_batch_log(ui: &mut Ui, state: &AppState) {
    ui.collapsing("Batch Log", |ui| {
        egui_extras::TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .column(egui_extras::Column::initial(60.0))
            .column(egui_extras::Column::initial(80.0))
            .column(egui_extras::Column::remainder().at_least(80.0))
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("#");
                });
                header.col(|ui| {
                    ui.strong("Deleted");
                });
                header.col(|ui| {
                    ui.strong("Running Total");
                });
            })
            .body(|body| {
                body.rows(18.0, state.batches.len(), |mut row| {
                    let idx = row.index();
                    if let Some(batch) = state.batches.get(idx) {
                        row.col(|ui| {
                            ui.label((idx + 1).to_string());
                        });
                        row.col(|ui| {
                            ui.label(batch.count.to_string());
                        });
                        row.col(|ui| {
                            ui.label(batch.total.to_string());
                        });
                    }
                });
            });
    });
}
