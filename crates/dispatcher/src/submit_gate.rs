use std::sync::atomic::{AtomicBool, Ordering};

/// 提交入口的开关
///
/// 与提交时的检查之间不做同步：和 `pause()` 并发的提交仍可能被接受，
/// 最多在暂停边界上多接受一个任务。
#[derive(Debug, Default)]
pub struct SubmitGate {
    paused: AtomicBool,
}

impl SubmitGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_starts_open() {
        assert!(!SubmitGate::new().is_paused());
    }

    #[test]
    fn test_pause_and_resume() {
        let gate = SubmitGate::new();
        gate.pause();
        assert!(gate.is_paused());
        gate.pause();
        assert!(gate.is_paused());
        gate.resume();
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_gates_are_independent() {
        let first = SubmitGate::new();
        let second = SubmitGate::new();
        first.pause();
        assert!(!second.is_paused());
    }
}
