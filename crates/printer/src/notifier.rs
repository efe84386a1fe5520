//! Failure notifiers
//!
//! [`LogNotifier`] only logs. [`CommandNotifier`] runs a desktop notification
//! command such as `notify-send "Printer Error"` with the message appended.

use crate::config::NotifierSettings;
use common::Notifier;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, error};

/// Notification title used by the default command
pub const NOTIFICATION_TITLE: &str = "Printer Error";

/// Logs failures at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, message: &str) -> common::Result<()> {
        error!("{}: {}", NOTIFICATION_TITLE, message);
        Ok(())
    }
}

/// Runs an external command per failure, message as the last argument
///
/// The command is started detached; its exit status is only logged.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    /// `None` when `command` is empty
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Notifier for CommandNotifier {
    fn notify_error(&self, message: &str) -> common::Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| common::Error::Notify(format!("{}: {}", self.program, e)))?;

        let program = self.program.clone();
        std::thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                debug!("Notification command {} exited with {}", program, status)
            }
            Ok(_) => {}
            Err(e) => debug!("Failed to wait for notification command {}: {}", program, e),
        });

        Ok(())
    }
}

/// Notifier selected by the configuration
pub fn from_settings(settings: &NotifierSettings) -> Arc<dyn Notifier> {
    match CommandNotifier::new(&settings.command) {
        Some(notifier) => Arc::new(notifier),
        None => Arc::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_empty_command_falls_back_to_log() {
        assert!(CommandNotifier::new(&[]).is_none());
        assert!(LogNotifier.notify_error("paper out").is_ok());
    }

    #[test]
    fn test_missing_program_reports_error() {
        let notifier = CommandNotifier::new(&["/nonexistent/notify-tool".to_string()]).unwrap();
        assert!(matches!(
            notifier.notify_error("x"),
            Err(common::Error::Notify(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_message_appended_as_last_argument() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("message.txt");

        // sh -c SCRIPT MESSAGE: the message lands in $0
        let script = format!("printf '%s' \"$0\" > '{}'", out.display());
        let notifier =
            CommandNotifier::new(&["sh".to_string(), "-c".to_string(), script]).unwrap();
        notifier.notify_error("USB bytes failed: boom").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(content) = std::fs::read_to_string(&out)
                && !content.is_empty()
            {
                assert_eq!(content, "USB bytes failed: boom");
                break;
            }
            assert!(Instant::now() < deadline, "notification command never ran");
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
