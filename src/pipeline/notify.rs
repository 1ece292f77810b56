use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

/// Surfaces transient success/failure toasts to the user
pub trait Notifier {
    fn notify(&self, message: &str, severity: Severity);
}

/// Queues toasts until the rendering layer drains them.
///
/// Clones share the same queue, so the controller can own one handle while
/// the renderer keeps another.
#[derive(Debug, Clone, Default)]
pub struct ToastQueue {
    queue: Rc<RefCell<VecDeque<Notification>>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, message: &str, severity: Severity) {
        self.queue.borrow_mut().push_back(Notification {
            message: message.to_string(),
            severity,
        });
    }
}

/// Sends toasts to the log, for headless use
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Success => log::info!("{}", message),
            Severity::Error => log::error!("{}", message),
        }
    }
}
