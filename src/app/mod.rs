use crossbeam_channel::{Receiver, Sender};
use egui::{Color32, Context, FontData, FontDefinitions, FontFamily, RichText};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{ErrorEvent, PipelineConfig, Result};
use crate::player::{AudioOutput, DisplayBuffer, FfmpegSource, PlaybackController, PreparedMedia};
use crate::renderer::EguiVideoRenderer;

/// 控制条背景（半透明深灰）
const CONTROL_STRIP_FILL: Color32 = Color32::from_rgba_premultiplied(0x2d, 0x2d, 0x2d, 0xaa);

pub struct VideoPlayerApp {
    controller: Option<PlaybackController>,
    audio: Option<AudioOutput>,
    renderer: EguiVideoRenderer,
    display: DisplayBuffer,
    file_name: String,

    /// 打开失败时的提示（模态窗口）
    open_error: Option<String>,
    /// 运行期错误（来自帧节拍线程）
    runtime_errors: Receiver<ErrorEvent>,
    runtime_errors_tx: Sender<ErrorEvent>,
    last_error: Option<String>,
}

impl VideoPlayerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, path: PathBuf, config: PipelineConfig) -> Self {
        info!("🎮 初始化 VideoPlayerApp");

        // 配置中文字体
        Self::setup_chinese_fonts(&cc.egui_ctx);

        let (runtime_errors_tx, runtime_errors) = crossbeam_channel::bounded(config.error_queue_capacity);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());

        let mut app = Self {
            controller: None,
            audio: None,
            renderer: EguiVideoRenderer::new(),
            display: DisplayBuffer::new(),
            file_name,
            open_error: None,
            runtime_errors,
            runtime_errors_tx,
            last_error: None,
        };

        if let Err(e) = app.open(&cc.egui_ctx, &path, &config) {
            error!("❌ 打开媒体失败: {} - {}", path.display(), e);
            app.open_error = Some(e.to_string());
        }
        app
    }

    /// 打开媒体、初始化音频设备并启动流水线
    fn open(&mut self, ctx: &Context, path: &Path, config: &PipelineConfig) -> Result<()> {
        let mut media = PreparedMedia::open(FfmpegSource::new(&path.to_string_lossy()))?;
        let info = media.media_info();

        let mut audio = match AudioOutput::new(info.sample_rate, config.audio_buffer_frames) {
            Ok(audio) => audio,
            Err(e) => {
                media.close();
                return Err(e);
            }
        };
        media.set_output_rate(audio.sample_rate());

        let pipeline = PlaybackController::start(media, config, self.display.clone())?;
        let mut controller = pipeline.controller;

        if let Err(e) = audio.play(pipeline.audio) {
            controller.stop();
            return Err(e);
        }

        let repaint_ctx = ctx.clone();
        let error_ctx = ctx.clone();
        let errors = self.runtime_errors_tx.clone();
        controller.run_pacer(
            pipeline.pacer,
            move || repaint_ctx.request_repaint(),
            move |event| {
                // UI 处理不过来时丢弃，不阻塞节拍线程
                if errors.try_send(event).is_ok() {
                    error_ctx.request_repaint();
                }
            },
        )?;

        info!("✅ 播放器已就绪: {}", info.description);
        self.controller = Some(controller);
        self.audio = Some(audio);
        Ok(())
    }

    /// 加载系统中文字体
    fn setup_chinese_fonts(ctx: &Context) {
        #[cfg(target_os = "windows")]
        let chinese_font_paths = ["C:/Windows/Fonts/msyh.ttc", "C:/Windows/Fonts/simhei.ttf"];
        #[cfg(target_os = "macos")]
        let chinese_font_paths = ["/System/Library/Fonts/PingFang.ttc", "/System/Library/Fonts/STHeiti Light.ttc"];
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let chinese_font_paths = [
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        ];

        let Some((font_path, font_data)) = chinese_font_paths
            .iter()
            .find_map(|p| std::fs::read(p).ok().map(|data| (*p, data)))
        else {
            warn!("⚠️ 未找到中文字体，使用默认字体");
            return;
        };

        let mut fonts = FontDefinitions::default();
        fonts
            .font_data
            .insert("chinese_font".to_owned(), FontData::from_owned(font_data));
        for family in [FontFamily::Proportional, FontFamily::Monospace] {
            if let Some(fonts) = fonts.families.get_mut(&family) {
                fonts.insert(0, "chinese_font".to_owned());
            }
        }
        ctx.set_fonts(fonts);
        info!("✅ 成功加载中文字体: {}", font_path);
    }

    fn toggle_playback(&mut self) {
        if let Some(controller) = &self.controller {
            controller.toggle();
        }
    }

    fn is_paused(&self) -> bool {
        self.controller.as_ref().map_or(true, |c| c.is_paused())
    }

    /// 两路数据都已消费完毕
    fn is_ended(&self) -> bool {
        let demux_done = self.controller.as_ref().map_or(false, |c| c.is_finished());
        let audio_done = self.audio.as_ref().map_or(true, |a| a.is_finished());
        demux_done && audio_done
    }

    fn drain_runtime_errors(&mut self) {
        while let Ok(event) = self.runtime_errors.try_recv() {
            warn!("⚠️  运行期错误: {}", event);
            self.last_error = Some(event.to_string());
        }
    }

    fn handle_keyboard_input(&mut self, ctx: &Context) {
        if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            self.toggle_playback();
        }
    }

    /// 渲染视频区域
    fn render_video_area(&mut self, ctx: &Context) {
        self.renderer.update(ctx, &self.display);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.available_rect_before_wrap();
                if self.renderer.has_texture() {
                    self.renderer.render(ui, rect);
                } else if self.open_error.is_none() {
                    ui.centered_and_justified(|ui| {
                        ui.label(RichText::new("正在加载…").color(Color32::GRAY));
                    });
                }
            });
    }

    /// 底部居中的悬浮控制条：文件名 + 播放/暂停
    fn render_control_strip(&mut self, ctx: &Context) {
        let paused = self.is_paused();
        let ended = self.is_ended();
        let mut toggle = false;

        egui::Area::new(egui::Id::new("control_strip"))
            .anchor(egui::Align2::CENTER_BOTTOM, egui::Vec2::new(0.0, -12.0))
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(CONTROL_STRIP_FILL)
                    .rounding(egui::Rounding::same(6.0))
                    .inner_margin(egui::Margin::symmetric(12.0, 6.0))
                    .show(ui, |ui| {
                        ui.horizontal(|ui| {
                            let icon = if paused { "▶" } else { "⏸" };
                            let button = egui::Button::new(RichText::new(icon).size(16.0).color(Color32::WHITE))
                                .frame(false);
                            if ui.add_enabled(self.controller.is_some() && !ended, button).clicked() {
                                toggle = true;
                            }

                            ui.label(RichText::new(&self.file_name).size(13.0).color(Color32::WHITE));

                            if ended {
                                ui.label(RichText::new("播放结束").size(12.0).color(Color32::LIGHT_GRAY));
                            }
                            if let Some(err) = &self.last_error {
                                ui.label(RichText::new(err).size(12.0).color(Color32::LIGHT_RED));
                            }
                        });
                    });
            });

        if toggle {
            self.toggle_playback();
        }
    }

    /// 打开失败的模态提示
    fn render_open_error(&mut self, ctx: &Context) {
        let Some(message) = self.open_error.clone() else {
            return;
        };

        let mut dismissed = false;
        egui::Window::new("无法播放")
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(RichText::new(&self.file_name).strong());
                ui.add_space(6.0);
                ui.label(RichText::new(message).color(Color32::LIGHT_RED));
                ui.add_space(10.0);
                if ui.button("确定").clicked() {
                    dismissed = true;
                }
            });

        if dismissed {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}

impl eframe::App for VideoPlayerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.drain_runtime_errors();
        self.handle_keyboard_input(ctx);

        self.render_video_area(ctx);
        self.render_control_strip(ctx);
        self.render_open_error(ctx);

        // 新帧由节拍线程触发重绘，这里只用于刷新结束状态
        if self.controller.is_some() && !self.is_ended() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("🔚 VideoPlayerApp 退出");

        if let Some(mut controller) = self.controller.take() {
            if let Some(report) = controller.stop() {
                info!("📊 解封装统计: {:?}", report.stats);
            }
        }
        if let Some(mut audio) = self.audio.take() {
            audio.stop();
        }
    }
}
