//! # Timer 模块
//!
//! `after` 指令排入的延时脚本。同一脚本同一时刻只能排队一次。

use std::collections::BTreeMap;
use std::time::Duration;

use crate::state::VarValue;

/// 排队中的延时脚本
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTimer {
    pub script: String,
    /// 会话时钟上的触发时间
    pub deadline: Duration,
    /// 排队时所在读取器的调用深度
    pub depth: usize,
    pub locals: BTreeMap<String, VarValue>,
}

/// 延时队列
#[derive(Debug, Clone, Default)]
pub struct TimerQueue {
    timers: Vec<PendingTimer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 排队，脚本已在队列中时返回 false
    pub fn schedule(&mut self, timer: PendingTimer) -> bool {
        if self.contains(&timer.script) {
            return false;
        }
        self.timers.push(timer);
        true
    }

    pub fn contains(&self, script: &str) -> bool {
        self.timers.iter().any(|t| t.script == script)
    }

    /// 取消某个脚本，返回是否确实在队列中
    pub fn cancel(&mut self, script: &str) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.script != script);
        before != self.timers.len()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// 取出所有到期的计时器，按触发时间排序（同时到期时保持排队顺序）
    pub fn take_due(&mut self, now: Duration) -> Vec<PendingTimer> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.timers).into_iter().partition(|t| t.deadline <= now);
        self.timers = pending;
        due.sort_by_key(|t| t.deadline);
        due
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(script: &str, ms: u64) -> PendingTimer {
        PendingTimer {
            script: script.to_string(),
            deadline: Duration::from_millis(ms),
            depth: 1,
            locals: BTreeMap::new(),
        }
    }

    #[test]
    fn test_same_script_queued_once() {
        let mut queue = TimerQueue::new();
        assert!(queue.schedule(timer("blink", 100)));
        assert!(!queue.schedule(timer("blink", 50)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_take_due_in_deadline_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(timer("late", 300));
        queue.schedule(timer("b", 200));
        queue.schedule(timer("a", 100));

        let due = queue.take_due(Duration::from_millis(250));
        let names: Vec<_> = due.iter().map(|t| t.script.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_cancel() {
        let mut queue = TimerQueue::new();
        queue.schedule(timer("blink", 100));
        assert!(queue.cancel("blink"));
        assert!(!queue.cancel("blink"));
        assert!(queue.is_empty());
    }
}
