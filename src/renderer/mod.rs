pub mod egui_video_renderer;

pub use egui_video_renderer::EguiVideoRenderer;
