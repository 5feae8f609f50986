use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("no recipient address")]
    NoRecipient,
    #[error("unable to deliver mail: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outgoing mail port.
#[rocket::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), MailError>;
}

/// Writes mail to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[rocket::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        if mail.to.trim().is_empty() {
            return Err(MailError::NoRecipient);
        }
        tracing::info!(to = %mail.to, subject = %mail.subject, "mail queued");
        tracing::debug!("{}", mail.html);
        Ok(())
    }
}

fn escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            c => c.to_string(),
        })
        .collect()
}

fn layout(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .container {{ max-width: 600px; margin: auto; padding: 20px; border: 1px solid #ddd; border-radius: 5px; }}
        .button {{ display: inline-block; padding: 10px 20px; background-color: #007bff; color: white; text-decoration: none; border-radius: 5px; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>{title}</h1>
        <p>Hello,</p>
{content}
        <p>Best regards,<br>CapTrak Team</p>
    </div>
</body>
</html>
"#,
        title = title,
        content = content
    )
}

pub mod template {
    use super::{escape, layout, Mail};

    pub fn request_accepted(to: &str, teacher_name: &str) -> Mail {
        Mail {
            to: to.to_string(),
            subject: "CapTrak - Request Accepted".to_string(),
            html: layout(
                "Request Accepted",
                &format!(
                    "        <p>Your request has been accepted by {}.</p>",
                    escape(teacher_name)
                ),
            ),
        }
    }

    pub fn request_rejected(to: &str, teacher_name: &str) -> Mail {
        Mail {
            to: to.to_string(),
            subject: "CapTrak - Request Rejected".to_string(),
            html: layout(
                "Request Rejected",
                &format!(
                    "        <p>Your request has been rejected by {}.</p>",
                    escape(teacher_name)
                ),
            ),
        }
    }

    pub fn password_recovery(to: &str, reset_url: &str) -> Mail {
        Mail {
            to: to.to_string(),
            subject: "Password Recovery".to_string(),
            html: layout(
                "Reset Your Password",
                &format!(
                    "        <p>You have requested to reset your password. Click the button below to proceed:</p>\n        <a href=\"{}\" class=\"button\">Reset Password</a>\n        <p>If you did not request this, please ignore this email. Your password will remain unchanged.</p>",
                    escape(reset_url)
                ),
            ),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::{Mail, MailError, Mailer};

    /// Keeps every mail it is given; fails all deliveries when `failing` is set.
    #[derive(Debug, Default)]
    pub struct RecordingMailer {
        pub failing: bool,
        sent: Mutex<Vec<Mail>>,
    }

    impl RecordingMailer {
        pub fn failing() -> RecordingMailer {
            RecordingMailer {
                failing: true,
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<Mail> {
            self.sent.lock().map(|it| it.clone()).unwrap_or_default()
        }
    }

    #[rocket::async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: Mail) -> Result<(), MailError> {
            if self.failing {
                return Err(MailError::Delivery("recording mailer set to fail".to_string()));
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(mail);
            }
            Ok(())
        }
    }
}
