use chrono::{DateTime, Utc};
use html_escape;

/// characters of a secret shown before it is cut off
const SECRET_VISIBLE_CHARS: usize = 20;

pub struct MessageFormatter;

impl MessageFormatter {
    pub fn escape_html(text: &str) -> String {
        html_escape::encode_text(text).to_string()
    }

    /// shortens api keys for display in admin panels
    pub fn mask_secret(secret: &str) -> String {
        if secret.is_empty() {
            return "Not set".to_string();
        }
        if secret.chars().count() <= SECRET_VISIBLE_CHARS {
            return secret.to_string();
        }
        let visible: String = secret.chars().take(SECRET_VISIBLE_CHARS).collect();
        format!("{}...", visible)
    }

    /// `dd/mm HH:MM` in UTC
    pub fn format_expiry(expires_at: DateTime<Utc>) -> String {
        expires_at.format("%d/%m %H:%M").to_string()
    }

    /// rough "Xh Ym" left until `expires_at`
    pub fn format_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
        let minutes = (expires_at - now).num_minutes().max(0);
        let (hours, minutes) = (minutes / 60, minutes % 60);
        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}m", minutes)
        }
    }

    /// `<a href>` with both parts escaped
    pub fn html_link(url: &str, text: &str) -> String {
        format!(
            "<a href=\"{}\">{}</a>",
            html_escape::encode_double_quoted_attribute(url),
            Self::escape_html(text)
        )
    }
}
