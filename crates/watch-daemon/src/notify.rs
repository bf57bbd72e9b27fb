use anyhow::{bail, Context};
use async_trait::async_trait;
use std::process::Stdio;
use tracing::debug;

use watch_core::monitor::Notifier;

/// Desktop notifications through the platform's command-line tool.
pub struct SystemNotifier;

/// Program and argument vector for one notification.  Nothing goes through a
/// shell; text embedded in a script is escaped for that script's quoting.
pub fn notification_command(title: &str, message: &str) -> (&'static str, Vec<String>) {
    #[cfg(target_os = "macos")]
    {
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            applescript_escape(message),
            applescript_escape(title)
        );
        ("osascript", vec!["-e".to_string(), script])
    }

    #[cfg(target_os = "windows")]
    {
        let script = format!(
            "[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] > $null; \
             $t = [Windows.UI.Notifications.ToastNotificationManager]::GetTemplateContent([Windows.UI.Notifications.ToastTemplateType]::ToastText02); \
             $x = $t.GetElementsByTagName('text'); \
             $x.Item(0).AppendChild($t.CreateTextNode('{}')) > $null; \
             $x.Item(1).AppendChild($t.CreateTextNode('{}')) > $null; \
             [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('streamwatch').Show([Windows.UI.Notifications.ToastNotification]::new($t))",
            powershell_escape(title),
            powershell_escape(message)
        );
        (
            "powershell",
            vec!["-NoProfile".to_string(), "-Command".to_string(), script],
        )
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        (
            "notify-send",
            vec![
                "--app-name=streamwatch".to_string(),
                title.to_string(),
                message.to_string(),
            ],
        )
    }
}

#[allow(dead_code)]
fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[allow(dead_code)]
fn powershell_escape(text: &str) -> String {
    text.replace('\'', "''")
}

#[async_trait]
impl Notifier for SystemNotifier {
    async fn notify(&self, title: &str, message: &str) -> anyhow::Result<()> {
        let (program, args) = notification_command(title, message);
        debug!("notify: {} {:?}", program, args);

        let status = tokio::process::Command::new(program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("failed to run {program}"))?;

        if !status.success() {
            bail!("{program} exited with {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaping() {
        assert_eq!(applescript_escape(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
        assert_eq!(powershell_escape("it's"), "it''s");
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    #[test]
    fn test_linux_command_passes_text_as_arguments() {
        let (program, args) = notification_command("Stream Started!", "a; rm -rf / is now live");
        assert_eq!(program, "notify-send");
        assert_eq!(args[1], "Stream Started!");
        assert_eq!(args[2], "a; rm -rf / is now live");
    }
}
