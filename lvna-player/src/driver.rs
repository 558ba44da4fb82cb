//! # Driver 模块
//!
//! 无头驱动：按固定帧率调用 `tick`，把会话发出的命令写入日志，
//! 并在配置允许时自动推进 halt 和 choice。
//!
//! 驱动方不做任何渲染和音频播放，适合在 CI 中完整跑一遍故事。

use std::time::Duration;

use lvna_runtime::{
    Command, InputKind, InterpreterState, PlayerEvent, RuntimeError, SceneError, Session,
};
use tracing::{debug, info, warn};

use crate::config::PlayerConfig;

/// 运行结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 主脚本执行完毕，没有剩余的后台脚本
    Finished,
    /// 场景因运行时错误中止
    SceneError,
    /// 等待用户输入，但自动推进已关闭
    WaitingForInput,
    /// 达到帧数上限
    FrameLimit,
}

/// 运行报告
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub frames: u64,
    pub reason: StopReason,
    /// 发出的命令总数
    pub commands: usize,
    /// 显示过的对话文本
    pub dialog: Vec<String>,
    pub scene_errors: Vec<SceneError>,
    /// 素材错误数
    pub asset_errors: usize,
}

/// 本帧对输入等待的处理
enum InputAction {
    /// 不在输入等待中，或等待时间未到
    Idle,
    /// 在等待输入但自动推进已关闭
    Blocked,
    Send(PlayerEvent),
}

/// 无头驱动
pub struct HeadlessDriver {
    session: Session,
    config: PlayerConfig,
    frame_time: Duration,
    /// 当前输入等待已持续的时间
    waited: Duration,
}

impl HeadlessDriver {
    pub fn new(session: Session, config: PlayerConfig) -> Self {
        let frame_time = config.frame_time();
        Self {
            session,
            config,
            frame_time,
            waited: Duration::ZERO,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// 运行到结束、出错、卡在输入或达到帧数上限
    pub fn run(&mut self) -> Result<RunReport, RuntimeError> {
        let mut report = RunReport {
            frames: 0,
            reason: StopReason::FrameLimit,
            commands: 0,
            dialog: Vec::new(),
            scene_errors: Vec::new(),
            asset_errors: 0,
        };

        while report.frames < self.config.max_frames {
            report.frames += 1;
            let commands = self.session.tick(self.frame_time);
            self.dispatch(commands, &mut report);

            if self.config.print_snapshots {
                match serde_json::to_string(&self.session.snapshot()) {
                    Ok(json) => info!(frame = report.frames, snapshot = %json, "快照"),
                    Err(e) => warn!(error = %e, "快照序列化失败"),
                }
            }

            if !report.scene_errors.is_empty() {
                report.reason = StopReason::SceneError;
                break;
            }
            if self.session.is_finished() {
                report.reason = StopReason::Finished;
                break;
            }

            match self.pending_input()? {
                InputAction::Idle => {}
                InputAction::Blocked => {
                    report.reason = StopReason::WaitingForInput;
                    break;
                }
                InputAction::Send(event) => {
                    info!(event = ?event, "自动推进");
                    let commands = self.session.advance(event)?;
                    self.dispatch(commands, &mut report);
                    if !report.scene_errors.is_empty() {
                        report.reason = StopReason::SceneError;
                        break;
                    }
                }
            }
        }

        report.asset_errors = self.session.asset_errors().len();
        info!(
            frames = report.frames,
            reason = ?report.reason,
            commands = report.commands,
            "播放结束"
        );
        Ok(report)
    }

    /// 处于输入等待时决定要发送的事件
    fn pending_input(&mut self) -> Result<InputAction, RuntimeError> {
        let InterpreterState::WaitingUserInput(kind) = self.session.state() else {
            self.waited = Duration::ZERO;
            return Ok(InputAction::Idle);
        };
        if !self.config.auto_advance {
            return Ok(InputAction::Blocked);
        }

        self.waited += self.frame_time;
        if self.waited < Duration::from_millis(self.config.auto_advance_delay_ms) {
            return Ok(InputAction::Idle);
        }
        self.waited = Duration::ZERO;

        let event = match kind {
            InputKind::Advance => PlayerEvent::Advance,
            InputKind::Choice { options, .. } => {
                if options.is_empty() {
                    return Err(RuntimeError::InvalidChoice { index: 0, max: 0 });
                }
                PlayerEvent::choice(self.config.auto_choice_index.min(options.len() - 1))
            }
        };
        Ok(InputAction::Send(event))
    }

    /// 宿主命令只记录到日志
    fn dispatch(&self, commands: Vec<Command>, report: &mut RunReport) {
        report.commands += commands.len();
        for command in commands {
            match command {
                Command::SceneStarted { chapter, scene } => {
                    info!(chapter = %chapter, scene = %scene, "场景开始");
                }
                Command::SceneFinished { chapter, scene } => {
                    info!(chapter = %chapter, scene = %scene, "场景结束");
                }
                Command::ShowDialogText { text, continuation } => {
                    info!(continuation, "💬 {}", text);
                    report.dialog.push(text);
                }
                Command::PresentChoices { options } => {
                    info!(options = ?options, "选项");
                }
                Command::SceneError(error) => {
                    warn!(error = %error, "场景出错");
                    report.scene_errors.push(error);
                }
                other => debug!(command = ?other, "宿主命令"),
            }
        }
    }
}
