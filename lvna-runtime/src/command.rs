//! # Command 模块
//!
//! 定义会话向驱动方发出的指令。
//!
//! 会话本身不绘制、不播放声音，只计算状态；
//! 音频、对话框等副作用以 Command 的形式交给外部协作者执行。
//! 精灵的视觉状态则通过每帧的 [`Snapshot`](crate::snapshot::Snapshot) 读取。

use serde::{Deserialize, Serialize};

use crate::state::SceneError;

/// 音频声道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioChannel {
    /// 音效
    Sound,
    /// 语音
    Voice,
    /// 音乐
    Music,
}

impl AudioChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sound => "sound",
            Self::Voice => "voice",
            Self::Music => "music",
        }
    }
}

/// 音量通道
///
/// 比音频声道多一个 `Text`，控制文字出现时的音效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeChannel {
    Sound,
    Voice,
    Music,
    Text,
}

/// 会话向驱动方发出的指令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 场景开始
    SceneStarted { chapter: String, scene: String },

    /// 场景脚本执行完毕
    SceneFinished { chapter: String, scene: String },

    /// 显示一行对话文本
    ///
    /// `continuation` 为 true 时接在上一行之后。
    ShowDialogText { text: String, continuation: bool },

    /// 清空对话文本
    ClearDialogText,

    /// 显示对话框
    ShowDialog,

    /// 关闭对话框
    CloseDialog,

    /// 切换字体
    SetFont { name: String },

    /// 播放音频
    PlayAudio {
        channel: AudioChannel,
        key: String,
        looping: bool,
    },

    /// 停止音频（`None` 表示全部声道）
    StopAudio { channel: Option<AudioChannel> },

    /// 设置音量（0.0 - 1.0）
    SetVolume { channel: VolumeChannel, level: f32 },

    /// 展示选项
    PresentChoices { options: Vec<String> },

    /// 场景因运行时错误中止
    SceneError(SceneError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_serialization() {
        let json = serde_json::to_string(&AudioChannel::Music).unwrap();
        assert_eq!(json, "\"music\"");
        let channel: VolumeChannel = serde_json::from_str("\"text\"").unwrap();
        assert_eq!(channel, VolumeChannel::Text);
    }
}
