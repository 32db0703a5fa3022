/// Transient notifications stacked in the top-right corner.
use std::time::{Duration, Instant};

pub const MAX_TOASTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    pub fn duration(self) -> Duration {
        match self {
            ToastKind::Info | ToastKind::Success => Duration::from_secs(3),
            ToastKind::Warning => Duration::from_secs(5),
            ToastKind::Error => Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
    pub created_at: Instant,
    pub duration: Duration,
}

#[derive(Debug, Default)]
pub struct ToastQueue {
    toasts: Vec<Toast>,
}

impl ToastQueue {
    /// Newest last. Past `MAX_TOASTS`, the oldest are dropped.
    pub fn push(&mut self, message: impl Into<String>, kind: ToastKind, now: Instant) {
        self.toasts.push(Toast {
            message: message.into(),
            kind,
            created_at: now,
            duration: kind.duration(),
        });
        if self.toasts.len() > MAX_TOASTS {
            let excess = self.toasts.len() - MAX_TOASTS;
            self.toasts.drain(..excess);
        }
    }

    /// Drop every toast whose age has reached its duration.
    pub fn purge(&mut self, now: Instant) {
        self.toasts
            .retain(|t| now.saturating_duration_since(t.created_at) < t.duration);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }

}

#[cfg(test)]
impl ToastQueue {
    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_keeps_newest() {
        let mut q = ToastQueue::default();
        let now = Instant::now();
        for i in 0..7 {
            q.push(format!("t{i}"), ToastKind::Info, now);
        }
        assert_eq!(q.len(), MAX_TOASTS);
        let msgs: Vec<&str> = q.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(msgs, vec!["t2", "t3", "t4", "t5", "t6"]);
    }

    #[test]
    fn test_purge_by_age() {
        let mut q = ToastQueue::default();
        let t0 = Instant::now();
        q.push("info", ToastKind::Info, t0);
        q.push("err", ToastKind::Error, t0);
        q.purge(t0 + Duration::from_secs(2));
        assert_eq!(q.len(), 2);
        q.purge(t0 + Duration::from_secs(3));
        assert_eq!(q.iter().next().unwrap().message, "err");
        q.purge(t0 + Duration::from_secs(8));
        assert!(q.is_empty());
    }
}
