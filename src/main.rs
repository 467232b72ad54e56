// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod acquisition;
mod config;
mod engine;
mod error;
mod export;
mod gui;
mod protocol;
mod queue;
mod simulator;
mod types;
mod visualizer;

use config::AppConfig;
use eframe::egui;

fn main() -> eframe::Result<()> {
    env_logger::init();

    let config = AppConfig::load();
    log::info!(
        "starting with port {} @ {} baud, tick {} ms",
        config.port_name,
        config.baud_rate,
        config.tick_ms
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([888.0, 600.0])
            .with_title("Tribometer"),
        ..Default::default()
    };

    eframe::run_native(
        "Tribometer",
        options,
        Box::new(|_cc| Box::new(gui::TribometerApp::new(config))),
    )
}
