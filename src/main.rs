use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

mod core;
mod player;
mod renderer;
mod app;

use app::VideoPlayerApp;
use crate::core::PipelineConfig;

/// 轻量音视频播放器
#[derive(Parser, Debug)]
#[command(name = "myy_lite_player", version, about)]
struct Args {
    /// 要播放的媒体文件
    path: Option<PathBuf>,

    /// 流水线配置文件 (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        // 过滤掉 wgpu_hal 和 wgpu_core 的警告日志，减少日志噪音
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Error)
        .init();

    let args = Args::parse();

    let Some(path) = args.path else {
        info!("用法: myy_lite_player <媒体文件> [--config <FILE>]");
        return Ok(());
    };

    let config = match &args.config {
        Some(config_path) => {
            info!("📄 加载配置: {}", config_path.display());
            PipelineConfig::load(config_path)?
        }
        None => PipelineConfig::default(),
    };
    config.validate()?;

    info!("🎬 MYY Lite Player 启动: {}", path.display());

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 360.0])
            .with_title("视频播放器"),
        renderer: eframe::Renderer::Wgpu,
        ..Default::default()
    };

    eframe::run_native(
        "视频播放器",
        options,
        Box::new(move |cc| Box::new(VideoPlayerApp::new(cc, path, config))),
    )
    .map_err(|e| anyhow::anyhow!("应用启动失败: {}", e))?;

    Ok(())
}
