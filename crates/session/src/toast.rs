use brigade_notify::NotificationCategory;
use brigade_scope::ScopeKey;
use serde::Serialize;

/// User-facing message for an escalated update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toast {
	pub scope: ScopeKey,
	pub category: NotificationCategory,
	pub title: String,
	pub body: String,
	/// Escalations folded into this toast since the previous one.
	pub coalesced: u32,
}

/// Fire-and-forget destination for toasts.
pub trait ToastSink: Send + Sync + 'static {
	fn show(&self, toast: Toast);
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogToastSink;

impl ToastSink for LogToastSink {
	fn show(&self, toast: Toast) {
		tracing::info!(scope = %toast.scope, title = %toast.title, coalesced = toast.coalesced, "session.toast");
	}
}
