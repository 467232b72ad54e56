// src/gui.rs
use crate::acquisition::{Acquisition, RunState, TickOutcome};
use crate::config::AppConfig;
use crate::engine;
use crate::export::{self, PlotStyle};
use crate::queue::{sample_queue, SampleReceiver};
use crate::types::*;
use crate::visualizer::{self, ReadingLabels};
use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotPoints};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub struct TribometerApp {
    config: AppConfig,
    is_connected: bool,
    device_ready: bool,
    connection_mode: ConnectionMode,
    acquisition: Acquisition,
    queue: SampleReceiver,
    log_messages: Vec<String>,
    rx: Receiver<TenzoMessage>,
    tx_cmd: Sender<GuiCommand>,
    engine: Option<JoinHandle<()>>,

    // run duration editor
    duration_limited: bool,
    duration_secs: u64,

    available_ports: Vec<String>,
    selected_port: String,
}

impl TribometerApp {
    pub fn new(config: AppConfig) -> Self {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let (samples, queue) = sample_queue(config.queue_capacity);
        let handle = engine::spawn_thread(tx, rx_cmd, samples);

        let ports = Self::scan_ports();
        let selected_port = if ports.is_empty() || ports.contains(&config.port_name) {
            config.port_name.clone()
        } else {
            ports[0].clone()
        };

        let mut app = Self {
            is_connected: false,
            device_ready: false,
            connection_mode: ConnectionMode::Hardware,
            acquisition: Acquisition::new(config.tick_period()),
            queue,
            log_messages: vec![],
            rx,
            tx_cmd,
            engine: Some(handle),
            duration_limited: config.test_duration().is_some(),
            duration_secs: config.test_duration().map_or(60, |d| d.as_secs()),
            available_ports: ports,
            selected_port,
            config,
        };
        app.log(app.text(UiText::Ready));
        app
    }

    fn apply_theme(&self, ctx: &egui::Context) {
        if self.config.dark_theme {
            ctx.set_visuals(egui::Visuals::dark());
        } else {
            let mut visuals = egui::Visuals::light();
            visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(245, 245, 247);
            visuals.window_fill = Color32::from_rgb(250, 250, 252);
            visuals.override_text_color = Some(Color32::from_rgb(30, 30, 35));
            ctx.set_visuals(visuals);
        }
    }

    fn text(&self, key: UiText) -> &'static str {
        self.config.language.text(key)
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 8 {
            self.log_messages.remove(0);
        }
    }

    fn set_language(&mut self, lang: Language) {
        if self.config.language != lang {
            self.config.language = lang;
            self.config.save();
        }
    }

    fn scan_ports() -> Vec<String> {
        match serialport::available_ports() {
            Ok(available) => available.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                log::warn!("port scan failed: {e}");
                Vec::new()
            }
        }
    }

    fn refresh_ports(&mut self) {
        self.available_ports = Self::scan_ports();
        if !self.available_ports.is_empty() && !self.available_ports.contains(&self.selected_port) {
            self.selected_port = self.available_ports[0].clone();
        }
        self.log(&format!(
            "{} {:?}",
            self.text(UiText::PortsScanned),
            self.available_ports
        ));
    }

    fn connect(&mut self) {
        if self.connection_mode == ConnectionMode::Hardware {
            self.config.port_name = self.selected_port.clone();
            self.config.save();
        }
        self.device_ready = false;
        self.tx_cmd
            .send(GuiCommand::Connect {
                mode: self.connection_mode,
                port: self.config.port(),
                protocol: self.config.protocol(),
                sim_line_period: Duration::from_millis(self.config.sim_line_ms),
            })
            .ok();
    }

    fn run_duration(&self) -> Option<Duration> {
        self.duration_limited
            .then(|| Duration::from_secs(self.duration_secs.max(1)))
    }

    fn start_run(&mut self) {
        let stale = self.queue.drain();
        if stale > 0 {
            log::debug!("dropped {stale} samples queued before the run");
        }
        self.config.test_duration_secs = self.duration_limited.then_some(self.duration_secs.max(1));
        self.config.save();
        self.acquisition.start(Instant::now(), self.run_duration());
        self.tx_cmd.send(GuiCommand::Capture(true)).ok();
        self.log(self.text(UiText::RunStarted));
    }

    fn stop_run(&mut self) {
        self.acquisition.stop();
        self.tx_cmd.send(GuiCommand::Capture(false)).ok();
        self.log(self.text(UiText::RunStopped));
    }

    fn plot_style(&self) -> PlotStyle {
        PlotStyle {
            caption: self.text(UiText::Title).to_owned(),
            x_label: self.text(UiText::AxisTime).to_owned(),
            y_label: self.text(UiText::AxisLoad).to_owned(),
            ..PlotStyle::default()
        }
    }

    fn export_png(&mut self) {
        let result = export::save_png(&self.config.export_dir, self.acquisition.series(), &self.plot_style());
        self.report_export(result);
    }

    fn export_csv(&mut self) {
        let result = export::save_csv(&self.config.export_dir, self.acquisition.series());
        self.report_export(result);
    }

    fn report_export(&mut self, result: crate::error::TenzoResult<std::path::PathBuf>) {
        match result {
            Ok(path) => {
                let msg = format!("{} {}", self.text(UiText::Exported), path.display());
                self.log(&msg);
            }
            Err(e) => {
                log::error!("export failed: {e}");
                let msg = format!("{} {e}", self.text(UiText::ExportFailed));
                self.log(&msg);
            }
        }
    }

    fn drain_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                TenzoMessage::Log(s) => self.log(&s),
                TenzoMessage::Status(b) => {
                    self.is_connected = b;
                    if !b {
                        self.device_ready = false;
                    }
                }
                TenzoMessage::DeviceReady => self.device_ready = true,
            }
        }
    }

    fn show_plot(&self, ui: &mut egui::Ui) {
        let series = self.acquisition.series();
        let color = if self.config.dark_theme {
            Color32::from_rgb(0, 220, 255)
        } else {
            Color32::BLACK
        };
        Plot::new("load_plot")
            .legend(Legend::default())
            .x_axis_label(self.text(UiText::AxisTime))
            .y_axis_label(self.text(UiText::AxisLoad))
            .include_x(0.0)
            .include_y(0.0)
            .auto_bounds_x()
            .auto_bounds_y()
            .show(ui, |plot_ui| {
                if !series.is_empty() {
                    plot_ui.line(
                        Line::new(PlotPoints::from_iter(series.points()))
                            .name(self.text(UiText::SeriesName))
                            .color(color)
                            .width(1.5),
                    );
                }
            });
    }

    fn show_status(&self, ui: &mut egui::Ui, now: Instant) {
        let (label, color) = if !self.is_connected {
            (self.text(UiText::NotConnected), Color32::GRAY)
        } else if !self.device_ready {
            (self.text(UiText::WaitingDevice), Color32::from_rgb(200, 140, 0))
        } else {
            (self.text(UiText::DeviceReady), Color32::from_rgb(30, 150, 60))
        };
        ui.label(egui::RichText::new(label).strong().color(color));

        match self.acquisition.state() {
            RunState::Running => {
                let elapsed = self.acquisition.elapsed(now);
                match self.acquisition.remaining(now) {
                    Some(left) => ui.label(format!(
                        "{} {:.0} s / {} {:.0} s",
                        self.text(UiText::Elapsed),
                        elapsed,
                        self.text(UiText::Remaining),
                        left.as_secs_f64().ceil()
                    )),
                    None => ui.label(format!("{} {:.0} s", self.text(UiText::Elapsed), elapsed)),
                };
            }
            RunState::Finished => {
                ui.label(self.text(UiText::RunFinished));
            }
            RunState::Idle => {}
        }
        ui.label(format!("{} {}", self.text(UiText::Queued), self.queue.len()));
    }
}

impl Drop for TribometerApp {
    fn drop(&mut self) {
        self.tx_cmd.send(GuiCommand::Shutdown).ok();
        if let Some(handle) = self.engine.take() {
            if handle.join().is_err() {
                log::error!("reader thread panicked");
            }
        }
    }
}

impl eframe::App for TribometerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.apply_theme(ctx);
        self.drain_messages();

        let now = Instant::now();
        if let TickOutcome::Expired = self.acquisition.tick(&self.queue, now) {
            self.tx_cmd.send(GuiCommand::Capture(false)).ok();
            self.log(self.text(UiText::RunFinished));
        }
        if let Some(wait) = self.acquisition.time_to_next_tick(now) {
            ctx.request_repaint_after(wait);
        } else {
            // keep engine messages flowing while idle
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        let running = self.acquisition.is_running();

        egui::TopBottomPanel::top("topbar").show(ctx, |ui| {
            ui.vertical(|ui| {
                ui.horizontal_wrapped(|ui| {
                    ui.heading(self.text(UiText::Title));
                    ui.label(
                        egui::RichText::new(self.text(UiText::Subtitle))
                            .color(Color32::from_rgb(120, 120, 130)),
                    );
                    ui.separator();
                    let sim_label = self.text(UiText::Sim);
                    let real_label = self.text(UiText::Real);
                    ui.add_enabled_ui(!self.is_connected, |ui| {
                        ui.selectable_value(
                            &mut self.connection_mode,
                            ConnectionMode::Simulation,
                            sim_label,
                        );
                        ui.selectable_value(
                            &mut self.connection_mode,
                            ConnectionMode::Hardware,
                            real_label,
                        );
                    });
                    ui.separator();
                    if ui.button(self.text(UiText::ThemeLight)).clicked() && self.config.dark_theme {
                        self.config.dark_theme = false;
                        self.config.save();
                        self.apply_theme(ctx);
                    }
                    if ui.button(self.text(UiText::ThemeDark)).clicked() && !self.config.dark_theme {
                        self.config.dark_theme = true;
                        self.config.save();
                        self.apply_theme(ctx);
                    }
                    ui.separator();
                    ui.label(self.text(UiText::LanguageSwitch));
                    let mut selected_language = self.config.language;
                    egui::ComboBox::from_id_source("language_switcher_top")
                        .selected_text(match self.config.language {
                            Language::English => "English",
                            Language::Russian => "Русский",
                        })
                        .show_ui(ui, |ui| {
                            ui.selectable_value(&mut selected_language, Language::English, "English");
                            ui.selectable_value(&mut selected_language, Language::Russian, "Русский");
                        });
                    if selected_language != self.config.language {
                        self.set_language(selected_language);
                    }
                });

                ui.horizontal(|ui| {
                    ui.add_enabled_ui(!running, |ui| {
                        if self.connection_mode == ConnectionMode::Hardware {
                            ui.label(self.text(UiText::PortLabel));
                            ui.add_enabled_ui(!self.is_connected, |ui| {
                                egui::ComboBox::from_id_source("port_selector_top")
                                    .selected_text(&self.selected_port)
                                    .show_ui(ui, |ui| {
                                        for p in &self.available_ports {
                                            ui.selectable_value(&mut self.selected_port, p.clone(), p);
                                        }
                                    });
                                if ui.button(self.text(UiText::RefreshPorts)).clicked() {
                                    self.refresh_ports();
                                }
                            });
                        }

                        let btn_txt = if self.is_connected {
                            self.text(UiText::Disconnect)
                        } else {
                            self.text(UiText::Connect)
                        };
                        if ui.button(btn_txt).clicked() {
                            if self.is_connected {
                                self.tx_cmd.send(GuiCommand::Disconnect).ok();
                            } else {
                                self.connect();
                            }
                        }
                        if self.is_connected && ui.button(self.text(UiText::ResetDevice)).clicked() {
                            self.device_ready = false;
                            self.tx_cmd.send(GuiCommand::ResetDevice).ok();
                        }

                        ui.separator();
                        let duration_label = self.text(UiText::Duration);
                        ui.checkbox(&mut self.duration_limited, duration_label);
                        ui.add_enabled(
                            self.duration_limited,
                            egui::DragValue::new(&mut self.duration_secs)
                                .clamp_range(1..=86_400)
                                .suffix(" s"),
                        );
                    });

                    let can_start = self.is_connected && self.device_ready;
                    if running {
                        if ui.button(self.text(UiText::StopRun)).clicked() {
                            self.stop_run();
                        }
                    } else if ui
                        .add_enabled(can_start, egui::Button::new(self.text(UiText::StartRun)))
                        .clicked()
                    {
                        self.start_run();
                    }

                    ui.separator();
                    let can_export = !running && !self.acquisition.series().is_empty();
                    if ui
                        .add_enabled(can_export, egui::Button::new(self.text(UiText::ExportPng)))
                        .clicked()
                    {
                        self.export_png();
                    }
                    if ui
                        .add_enabled(can_export, egui::Button::new(self.text(UiText::ExportCsv)))
                        .clicked()
                    {
                        self.export_csv();
                    }
                });
            });
        });

        egui::SidePanel::left("status_panel")
            .resizable(true)
            .min_width(240.0)
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.label(egui::RichText::new(self.text(UiText::Readings)).strong());
                let labels = ReadingLabels {
                    current: self.text(UiText::Current),
                    max: self.text(UiText::Maximum),
                    min: self.text(UiText::Minimum),
                    mean: self.text(UiText::Mean),
                    count: self.text(UiText::Count),
                    unit: self.text(UiText::Unit),
                };
                visualizer::readings_table(ui, self.acquisition.readings(), &labels);
                ui.add_space(6.0);
                visualizer::draw_load_gauge(ui, self.acquisition.readings(), self.config.dark_theme);
                ui.separator();
                self.show_status(ui, now);
                ui.separator();
                ui.label(self.text(UiText::Logs));
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        for m in &self.log_messages {
                            ui.monospace(m);
                        }
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if !self.is_connected && self.acquisition.series().is_empty() {
                ui.label(self.text(UiText::ConnectFirst));
            }
            self.show_plot(ui);
        });
    }
}

impl Language {
    fn text(&self, key: UiText) -> &'static str {
        match (self, key) {
            (Language::English, UiText::Title) => "Tribometer",
            (Language::English, UiText::Subtitle) => "Load sensor monitor",
            (Language::English, UiText::Sim) => "SIM",
            (Language::English, UiText::Real) => "REAL",
            (Language::English, UiText::PortLabel) => "Port:",
            (Language::English, UiText::RefreshPorts) => "Refresh",
            (Language::English, UiText::PortsScanned) => "Ports scanned:",
            (Language::English, UiText::Connect) => "CONNECT",
            (Language::English, UiText::Disconnect) => "DISCONNECT",
            (Language::English, UiText::ResetDevice) => "🔄 RESET DEVICE",
            (Language::English, UiText::Duration) => "Test duration",
            (Language::English, UiText::StartRun) => "▶ START TEST",
            (Language::English, UiText::StopRun) => "⏹ STOP TEST",
            (Language::English, UiText::ExportPng) => "Save PNG",
            (Language::English, UiText::ExportCsv) => "Save CSV",
            (Language::English, UiText::ThemeLight) => "☀️",
            (Language::English, UiText::ThemeDark) => "🌙",
            (Language::English, UiText::LanguageSwitch) => "Language",
            (Language::English, UiText::Readings) => "READINGS",
            (Language::English, UiText::Current) => "Current",
            (Language::English, UiText::Maximum) => "Maximum",
            (Language::English, UiText::Minimum) => "Minimum",
            (Language::English, UiText::Mean) => "Mean",
            (Language::English, UiText::Count) => "Samples",
            (Language::English, UiText::Unit) => "g",
            (Language::English, UiText::NotConnected) => "Not connected",
            (Language::English, UiText::WaitingDevice) => "Waiting for device...",
            (Language::English, UiText::DeviceReady) => "Device ready",
            (Language::English, UiText::Elapsed) => "Elapsed",
            (Language::English, UiText::Remaining) => "left",
            (Language::English, UiText::Queued) => "Queued:",
            (Language::English, UiText::Logs) => "Logs",
            (Language::English, UiText::AxisTime) => "Time, s",
            (Language::English, UiText::AxisLoad) => "Load on sensor, g",
            (Language::English, UiText::SeriesName) => "Load",
            (Language::English, UiText::Ready) => "Tribometer ready.",
            (Language::English, UiText::RunStarted) => "Test started.",
            (Language::English, UiText::RunStopped) => "Test stopped.",
            (Language::English, UiText::RunFinished) => "Test finished.",
            (Language::English, UiText::Exported) => "Saved:",
            (Language::English, UiText::ExportFailed) => "Export failed:",
            (Language::English, UiText::ConnectFirst) => "Connect to the device first.",

            (Language::Russian, UiText::Title) => "Трибометр",
            (Language::Russian, UiText::Subtitle) => "Монитор тензодатчика",
            (Language::Russian, UiText::Sim) => "СИМУЛЯЦИЯ",
            (Language::Russian, UiText::Real) => "УСТРОЙСТВО",
            (Language::Russian, UiText::PortLabel) => "Порт:",
            (Language::Russian, UiText::RefreshPorts) => "Обновить",
            (Language::Russian, UiText::PortsScanned) => "Найдены порты:",
            (Language::Russian, UiText::Connect) => "ПОДКЛЮЧИТЬ",
            (Language::Russian, UiText::Disconnect) => "ОТКЛЮЧИТЬ",
            (Language::Russian, UiText::ResetDevice) => "🔄 СБРОС",
            (Language::Russian, UiText::Duration) => "Длительность теста",
            (Language::Russian, UiText::StartRun) => "▶ НАЧАТЬ ТЕСТ",
            (Language::Russian, UiText::StopRun) => "⏹ ОСТАНОВИТЬ",
            (Language::Russian, UiText::ExportPng) => "Сохранить PNG",
            (Language::Russian, UiText::ExportCsv) => "Сохранить CSV",
            (Language::Russian, UiText::ThemeLight) => "☀️",
            (Language::Russian, UiText::ThemeDark) => "🌙",
            (Language::Russian, UiText::LanguageSwitch) => "Язык",
            (Language::Russian, UiText::Readings) => "ПОКАЗАНИЯ",
            (Language::Russian, UiText::Current) => "Текущее",
            (Language::Russian, UiText::Maximum) => "Максимум",
            (Language::Russian, UiText::Minimum) => "Минимум",
            (Language::Russian, UiText::Mean) => "Среднее",
            (Language::Russian, UiText::Count) => "Отсчётов",
            (Language::Russian, UiText::Unit) => "г",
            (Language::Russian, UiText::NotConnected) => "Нет подключения",
            (Language::Russian, UiText::WaitingDevice) => "Ожидание устройства...",
            (Language::Russian, UiText::DeviceReady) => "Устройство готово",
            (Language::Russian, UiText::Elapsed) => "Прошло",
            (Language::Russian, UiText::Remaining) => "осталось",
            (Language::Russian, UiText::Queued) => "В очереди:",
            (Language::Russian, UiText::Logs) => "Журнал",
            (Language::Russian, UiText::AxisTime) => "Время, с",
            (Language::Russian, UiText::AxisLoad) => "Вес на датчик, г",
            (Language::Russian, UiText::SeriesName) => "Нагрузка",
            (Language::Russian, UiText::Ready) => "Трибометр готов.",
            (Language::Russian, UiText::RunStarted) => "Тест начат.",
            (Language::Russian, UiText::RunStopped) => "Тест остановлен.",
            (Language::Russian, UiText::RunFinished) => "Тест завершён.",
            (Language::Russian, UiText::Exported) => "Сохранено:",
            (Language::Russian, UiText::ExportFailed) => "Ошибка экспорта:",
            (Language::Russian, UiText::ConnectFirst) => "Сначала подключите устройство.",
        }
    }
}

#[derive(Clone, Copy)]
enum UiText {
    Title,
    Subtitle,
    Sim,
    Real,
    PortLabel,
    RefreshPorts,
    PortsScanned,
    Connect,
    Disconnect,
    ResetDevice,
    Duration,
    StartRun,
    StopRun,
    ExportPng,
    ExportCsv,
    ThemeLight,
    ThemeDark,
    LanguageSwitch,
    Readings,
    Current,
    Maximum,
    Minimum,
    Mean,
    Count,
    Unit,
    NotConnected,
    WaitingDevice,
    DeviceReady,
    Elapsed,
    Remaining,
    Queued,
    Logs,
    AxisTime,
    AxisLoad,
    SeriesName,
    Ready,
    RunStarted,
    RunStopped,
    RunFinished,
    Exported,
    ExportFailed,
    ConnectFirst,
}
