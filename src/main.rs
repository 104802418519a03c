// Gmail Purge - bulk Gmail deletion tool
// Copyright (C) 2026  Asa V. Schaeffer
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use mimalloc::MiMalloc;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod app;
mod bridge;
mod config;
mod engine;
mod error;
mod gmail;
mod scheduler;
mod state;
mod ui;

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (config, gateway) = match load() {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };
    tracing::info!(
        "Using token file {} for user {}",
        config.gmail.token_path.display(),
        config.gmail.user_id
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 600.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Gmail Purge",
        options,
        Box::new(move |cc| Ok(Box::new(app::GmailPurgeApp::new(cc, &config, gateway)))),
    )
}

fn load() -> Result<(config::Config, Arc<dyn gmail::MailGateway>), error::AppError> {
    let config = config::Config::from_env()?;
    let gateway = gmail::client::GmailClient::new(&config.gmail)?;
    Ok((config, Arc::new(gateway)))
}
