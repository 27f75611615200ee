use crate::core::{PlayerError, Result};

/// 单个立体声采样所占字节数（两个小端 f64）
pub const SAMPLE_PAIR_BYTES: usize = 16;

/// 流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// 媒体包（由 MediaSource 读取，按流类型分发）
#[derive(Debug)]
pub struct MediaPacket<P> {
    pub kind: StreamKind,
    pub stream_index: usize,
    pub data: P,
}

/// 视频帧数据
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,      // RGBA，紧密排列，无行填充
}

impl VideoFrame {
    pub fn rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

/// 立体声采样（左/右声道）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplePair {
    pub left: f64,
    pub right: f64,
}

impl SamplePair {
    pub const SILENCE: SamplePair = SamplePair { left: 0.0, right: 0.0 };

    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// 编码为 16 字节小端负载
    pub fn to_le_bytes(&self) -> [u8; SAMPLE_PAIR_BYTES] {
        let mut out = [0u8; SAMPLE_PAIR_BYTES];
        out[..8].copy_from_slice(&self.left.to_le_bytes());
        out[8..].copy_from_slice(&self.right.to_le_bytes());
        out
    }
}

fn read_f64_le(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    f64::from_le_bytes(buf)
}

/// 将音频负载解析为立体声采样序列
///
/// 负载是连续的小端 f64：偶数下标为左声道，奇数下标为右声道。
/// 长度不是 16 的整数倍时返回解码错误（不做截断）。
pub fn sample_pairs(payload: &[u8]) -> Result<impl Iterator<Item = SamplePair> + '_> {
    if payload.len() % SAMPLE_PAIR_BYTES != 0 {
        return Err(PlayerError::DecodeError(format!(
            "音频负载长度 {} 不是 {} 字节的整数倍",
            payload.len(),
            SAMPLE_PAIR_BYTES
        )));
    }

    Ok(payload.chunks_exact(SAMPLE_PAIR_BYTES).map(|chunk| {
        let (left, right) = chunk.split_at(8);
        SamplePair::new(read_f64_le(left), read_f64_le(right))
    }))
}

/// 媒体信息（打开流后获得）
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
    pub sample_rate: u32,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_sample_pairs_follow_payload_order() {
        let bytes = payload(&[0.5, -0.5, 0.25, -0.25, 1.0, -1.0]);
        let pairs: Vec<_> = sample_pairs(&bytes).unwrap().collect();

        assert_eq!(
            pairs,
            vec![
                SamplePair::new(0.5, -0.5),
                SamplePair::new(0.25, -0.25),
                SamplePair::new(1.0, -1.0),
            ]
        );
    }

    #[test]
    fn test_sample_pairs_empty_payload() {
        assert_eq!(sample_pairs(&[]).unwrap().count(), 0);
    }

    #[test]
    fn test_sample_pairs_rejects_partial_pair() {
        // 一个完整的 f64 但缺少右声道
        let bytes = payload(&[0.5, -0.5, 0.75]);
        assert!(matches!(sample_pairs(&bytes), Err(PlayerError::DecodeError(_))));

        let odd = vec![0u8; 17];
        assert!(sample_pairs(&odd).is_err());
    }

    #[test]
    fn test_sample_pair_le_bytes() {
        let pair = SamplePair::new(0.125, -3.5);
        let bytes = pair.to_le_bytes();
        assert_eq!(&bytes[..8], &0.125f64.to_le_bytes());
        assert_eq!(sample_pairs(&bytes).unwrap().next(), Some(pair));
    }
}
