//! Email service for battle request and status notifications.

use chrono::NaiveDate;
use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;

use crate::{config::Config, db::models::battle_requests::BattleRequest, errors::Error};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
    base_url: String,
    channel_name: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            crate::config::EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                // Use SMTP transport
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            crate::config::EmailTransportConfig::File { path } => {
                // Use file transport for development/testing
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                let file_transport = AsyncFileTransport::<Tokio1Executor>::new(emails_dir);
                EmailTransport::File(file_transport)
            }
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            reply_to: email_config.reply_to.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            channel_name: config.twitch.channel_name.clone(),
        })
    }

    /// Notify the admin that a new request arrived, with the accept/reject
    /// magic links embedding the request token.
    pub async fn send_request_received_email(&self, to_email: &str, request: &BattleRequest) -> Result<(), Error> {
        let subject = format!("New battle request from {}", request.name);
        let body = self.create_request_received_body(request);

        self.send_email(to_email, None, &subject, &body).await
    }

    /// Tell the requester their battle is confirmed.
    pub async fn send_confirmation_email(&self, request: &BattleRequest) -> Result<(), Error> {
        let subject = "Your battle request has been confirmed!";
        let body = self.create_confirmation_body(request);

        self.send_email(&request.email, Some(&request.name), subject, &body).await
    }

    /// Tell the requester their battle was declined.
    pub async fn send_rejection_email(&self, request: &BattleRequest) -> Result<(), Error> {
        let subject = "About your battle request";
        let body = self.create_rejection_body(request);

        self.send_email(&request.email, Some(&request.name), subject, &body).await
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        // Create from mailbox
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        // Create to mailbox
        let to = if let Some(name) = to_name {
            format!("{name} <{to_email}>")
        } else {
            to_email.to_string()
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        // Build message
        let mut builder = Message::builder().from(from).to(to).subject(subject).header(ContentType::TEXT_HTML);

        if let Some(reply_to) = &self.reply_to {
            let reply_to = reply_to.parse::<Mailbox>().map_err(|e| Error::Internal {
                operation: format!("parse reply-to email: {e}"),
            })?;
            builder = builder.reply_to(reply_to);
        }

        let message = builder.body(body.to_string()).map_err(|e| Error::Internal {
            operation: format!("build email message: {e}"),
        })?;

        // Send based on transport type
        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }

    fn channel_url(&self) -> String {
        format!("https://www.twitch.tv/{}", self.channel_name)
    }

    fn create_request_received_body(&self, request: &BattleRequest) -> String {
        let accept_url = format!("{}/admin?token={}&action=accept", self.base_url, request.token);
        let reject_url = format!("{}/admin?token={}&action=reject", self.base_url, request.token);
        let formatted_date = format_request_date(request.requested_date);

        let notes_row = match &request.notes {
            Some(notes) => format!("<p><strong>Notes:</strong> {notes}</p>"),
            None => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>New Battle Request</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .details {{ background-color: #f4f4f6; padding: 15px; border-radius: 4px; margin: 15px 0; }}
        .accept {{ display: inline-block; background-color: #2da44e; color: white; padding: 10px 20px; margin-right: 10px; text-decoration: none; border-radius: 4px; font-weight: bold; }}
        .reject {{ display: inline-block; background-color: #cf222e; color: white; padding: 10px 20px; text-decoration: none; border-radius: 4px; font-weight: bold; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>New Battle Request</h2>

        <p>You have received a new battle request from <strong>{name}</strong>.</p>

        <div class="details">
            <p><strong>Name:</strong> {name}</p>
            <p><strong>Email:</strong> {email}</p>
            <p><strong>Twitch Username:</strong> {twitch_username}</p>
            <p><strong>Game:</strong> {game}</p>
            <p><strong>Requested Date:</strong> {formatted_date}</p>
            <p><strong>Requested Time:</strong> {requested_time}</p>
            {notes_row}
        </div>

        <p>
            <a class="accept" href="{accept_url}">Accept Request</a>
            <a class="reject" href="{reject_url}">Decline Request</a>
        </p>

        <div class="footer">
            <p>This email was sent automatically by your battle request system.</p>
        </div>
    </div>
</body>
</html>"#,
            name = request.name,
            email = request.email,
            twitch_username = request.twitch_username,
            game = request.game,
            requested_time = request.requested_time,
        )
    }

    fn create_confirmation_body(&self, request: &BattleRequest) -> String {
        let formatted_date = format_request_date(request.requested_date);
        let channel_url = self.channel_url();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Battle Request Confirmed</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .details {{ background-color: #f4f4f6; padding: 15px; border-radius: 4px; margin: 15px 0; }}
        .notice {{ padding: 15px; border-left: 4px solid #2da44e; background-color: #f4f4f6; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Battle Request Confirmed!</h2>

        <p>Hello {name},</p>

        <p>Great news! Your battle request has been <strong>confirmed</strong>. Get ready to play!</p>

        <div class="details">
            <p><strong>Date:</strong> {formatted_date}</p>
            <p><strong>Time:</strong> {requested_time}</p>
            <p><strong>Game:</strong> {game}</p>
            <p><strong>Twitch Channel:</strong> <a href="{channel_url}">{channel_url}</a></p>
        </div>

        <div class="notice">
            <p><strong>Important:</strong> Please be online at least 5 minutes before the scheduled time, and follow the channel so you'll know when the stream starts!</p>
        </div>

        <p>If you have any questions or need to reschedule, please reply to this email.</p>

        <div class="footer">
            <p>See you soon!</p>
        </div>
    </div>
</body>
</html>"#,
            name = request.name,
            requested_time = request.requested_time,
            game = request.game,
        )
    }

    fn create_rejection_body(&self, request: &BattleRequest) -> String {
        let formatted_date = format_request_date(request.requested_date);
        let channel_url = self.channel_url();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Battle Request Update</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .notice {{ background-color: #f4f4f6; padding: 15px; border-radius: 4px; margin: 15px 0; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Battle Request Update</h2>

        <p>Hello {name},</p>

        <p>Thank you for your interest in battling. Unfortunately, your request for <strong>{formatted_date}</strong> at <strong>{requested_time}</strong> could not be accepted. This is usually down to scheduling conflicts or other commitments.</p>

        <div class="notice">
            <p>Feel free to submit a new request for a different date and time!</p>
        </div>

        <p><a href="{channel_url}">Follow the channel on Twitch</a> to catch the next stream.</p>

        <div class="footer">
            <p>Thanks for your understanding!</p>
        </div>
    </div>
</body>
</html>"#,
            name = request.name,
            requested_time = request.requested_time,
        )
    }
}

/// Format a booking date for email bodies, e.g. "June 1, 2024".
fn format_request_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}
