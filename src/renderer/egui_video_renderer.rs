use crate::player::DisplayBuffer;
use egui::{Color32, ColorImage, Context, Pos2, Rect, TextureHandle, TextureOptions, Ui, Vec2};
use log::{debug, info, warn};

/// egui 视频渲染器 - 把 DisplayBuffer 的内容上传为纹理并按比例绘制
pub struct EguiVideoRenderer {
    texture: Option<TextureHandle>,
    /// 已上传到纹理的缓冲区代数，未变化时跳过上传
    last_generation: u64,
    size: [usize; 2],
    uploads: u64,
}

impl EguiVideoRenderer {
    pub fn new() -> Self {
        info!("🎨 初始化 EguiVideoRenderer");
        Self {
            texture: None,
            last_generation: 0,
            size: [0, 0],
            uploads: 0,
        }
    }

    /// 显示缓冲区有新帧时更新纹理，返回是否发生了上传
    pub fn update(&mut self, ctx: &Context, display: &DisplayBuffer) -> bool {
        let generation = display.generation();
        if generation == self.last_generation {
            return false;
        }

        let image = display.with(|buf| {
            let size = [buf.width as usize, buf.height as usize];
            if size[0] == 0 || size[1] == 0 || buf.data.len() != size[0] * size[1] * 4 {
                warn!(
                    "⚠️  跳过尺寸异常的帧: {}x{}, {} 字节",
                    buf.width,
                    buf.height,
                    buf.data.len()
                );
                return None;
            }
            Some(ColorImage::from_rgba_unmultiplied(size, &buf.data))
        });
        self.last_generation = generation;

        let Some(image) = image else {
            return false;
        };

        let size = image.size;
        match &mut self.texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                info!("🖼️  创建视频纹理: {}x{}", size[0], size[1]);
                self.texture = Some(ctx.load_texture("video_frame", image, TextureOptions::LINEAR));
            }
        }
        if size != self.size {
            debug!("视频纹理尺寸变化: {:?} -> {:?}", self.size, size);
            self.size = size;
        }
        self.uploads += 1;
        true
    }

    /// 在 rect 内居中绘制当前纹理，保持宽高比
    pub fn render(&self, ui: &mut Ui, rect: Rect) {
        let Some(texture) = &self.texture else {
            return;
        };
        let display_rect = fit_rect(rect, self.size);
        let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
        ui.painter().image(texture.id(), display_rect, uv, Color32::WHITE);
    }

    /// 检查是否有纹理（用于判断是否应该显示占位符）
    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}

impl Default for EguiVideoRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// 计算保持宽高比的居中显示区域
fn fit_rect(rect: Rect, size: [usize; 2]) -> Rect {
    if size[0] == 0 || size[1] == 0 || rect.height() <= 0.0 {
        return rect;
    }
    let video_aspect = size[0] as f32 / size[1] as f32;
    let rect_aspect = rect.width() / rect.height();

    let display_size = if video_aspect > rect_aspect {
        // 视频更宽，以宽度为准
        Vec2::new(rect.width(), rect.width() / video_aspect)
    } else {
        Vec2::new(rect.height() * video_aspect, rect.height())
    };
    Rect::from_center_size(rect.center(), display_size)
}
