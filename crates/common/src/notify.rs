//! Failure notification seam

/// Surfaces fatal print failures to the user
///
/// Fire-and-forget: the print worker logs and drops any error returned here.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str) -> crate::Result<()>;
}
