use crate::bridge::UiCommand;
use crate::gmail::DeleteMode;
use crate::state::AppState;
use egui::Ui;
use tokio::sync::mpsc::UnboundedSender;

const CATEGORIES: &[(&str, &str)] = &[("promotions", "Delete Promotions"), ("updates", "Delete Updates")];

pub fn draw_sidebar(ui: &mut Ui, state: &mut AppState, cmd_tx: &UnboundedSender<UiCommand>) {
    let busy = state.busy();

    ui.heading("Search");
    ui.add_space(4.0);

    ui.label("Gmail search query");
    ui.add_enabled(
        !busy,
        egui::TextEdit::singleline(&mut state.query).hint_text("subject:unsubscribe"),
    );

    ui.add_space(4.0);
    ui.add_enabled(
        !busy,
        egui::Checkbox::new(&mut state.continuous, "Keep going until nothing matches"),
    );
    ui.add_enabled(
        !busy,
        egui::Checkbox::new(&mut state.oldest_first, "Oldest first (per page)"),
    );

    ui.add_space(8.0);
    if ui
        .add_enabled(state.can_start(), egui::Button::new("Delete Emails"))
        .clicked()
    {
        state.begin_start();
        let _ = cmd_tx.send(UiCommand::Start(state.query_request()));
    }

    ui.add_space(8.0);
    ui.separator();
    ui.add_space(4.0);

    ui.label("Categories");
    for (label, caption) in CATEGORIES {
        if ui.add_enabled(!busy, egui::Button::new(*caption)).clicked() {
            state.begin_start();
            let _ = cmd_tx.send(UiCommand::Start(state.category_request(label)));
        }
    }

    ui.add_space(8.0);
    ui.separator();
    ui.add_space(4.0);

    ui.label("Delete Mode");
    ui.add_enabled_ui(!busy, |ui| {
        ui.radio_value(&mut state.delete_mode, DeleteMode::Trash, "Move to Trash");
        ui.radio_value(
            &mut state.delete_mode,
            DeleteMode::Permanent,
            "Permanently Delete",
        );
    });
}
