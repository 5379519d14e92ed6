use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use tutorchat_contracts::transcript::{Role, Transcript};

pub const EXPORT_TITLE: &str = "Tutoring Session History";
pub const EXPORT_FOOTER: &str = "Exported from tutorchat, your math tutoring assistant";
pub const IMAGE_PLACEHOLDER: &str = "[Image attached - not exported]";

pub fn default_export_file_name(date: NaiveDate) -> String {
    format!("tutor-chat-{}.html", date.format("%Y-%m-%d"))
}

fn sender_label(role: Role) -> &'static str {
    match role {
        Role::User => "Student",
        Role::Model => "Tutor",
    }
}

pub fn render_transcript_html(transcript: &Transcript, exported_at: DateTime<Local>) -> String {
    let mut entries = String::new();
    for message in transcript.messages() {
        let class = match message.role {
            Role::User => "entry student",
            Role::Model if message.is_error => "entry tutor error",
            Role::Model => "entry tutor",
        };
        entries.push_str(&format!(
            "  <div class='{class}'>\n    <div class='sender'>{sender} <span class='time'>({time})</span></div>\n",
            sender = sender_label(message.role),
            time = message.timestamp.format("%H:%M"),
        ));
        for line in message.text.split('\n') {
            if line.is_empty() {
                entries.push_str("    <p>&nbsp;</p>\n");
            } else {
                entries.push_str(&format!("    <p>{}</p>\n", escape_html(line)));
            }
        }
        if message.image.is_some() {
            entries.push_str(&format!(
                "    <p class='note'>{}</p>\n",
                escape_html(IMAGE_PLACEHOLDER)
            ));
        }
        entries.push_str("  </div>\n");
    }

    format!(
        "<!doctype html>\n<html>\n<head>\n  <meta charset='utf-8'>\n  <title>{title}</title>\n  <style>\n    body {{ font-family: Arial, sans-serif; font-size: 12pt; max-width: 800px; margin: 0 auto; padding: 24px; }}\n    h1 {{ text-align: center; }}\n    .stamp {{ text-align: center; font-style: italic; color: #666; border-bottom: 1px solid #999; padding-bottom: 16px; }}\n    .entry {{ margin-top: 16px; }}\n    .entry p {{ margin: 2px 0 2px 24px; }}\n    .sender {{ font-weight: bold; }}\n    .student .sender {{ color: #2563eb; }}\n    .tutor .sender {{ color: #16a34a; }}\n    .error p {{ color: #b91c1c; }}\n    .time {{ font-weight: normal; font-size: 9pt; color: #999; }}\n    .note {{ font-style: italic; color: #999; }}\n    footer {{ margin-top: 32px; border-top: 1px solid #999; padding-top: 12px; text-align: center; font-style: italic; color: #666; }}\n  </style>\n</head>\n<body>\n  <h1>{title}</h1>\n  <div class='stamp'>Exported at {stamp}</div>\n{entries}  <footer>{footer}</footer>\n</body>\n</html>\n",
        title = escape_html(EXPORT_TITLE),
        stamp = exported_at.format("%Y-%m-%d %H:%M:%S"),
        footer = escape_html(EXPORT_FOOTER),
    )
}

/// Writes the transcript as a standalone HTML page. A directory target gets
/// the dated default file name inside it.
pub fn export_transcript_html(transcript: &Transcript, target: &Path) -> Result<PathBuf> {
    let now = Local::now();
    let out_path = if target.is_dir() {
        target.join(default_export_file_name(now.date_naive()))
    } else {
        target.to_path_buf()
    };
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(&out_path, render_transcript_html(transcript, now))
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    Ok(out_path)
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{Local, NaiveDate, TimeZone};
    use tutorchat_contracts::attachments::InlineImage;
    use tutorchat_contracts::transcript::{Message, Transcript};

    use super::{
        default_export_file_name, escape_html, export_transcript_html, render_transcript_html,
        IMAGE_PLACEHOLDER,
    };

    fn sample() -> Transcript {
        let mut transcript = Transcript::with_greeting("Hello!");
        let image = InlineImage::from_data_url("data:image/png;base64,AAAA").ok();
        transcript.push(Message::user("Is x < 3?\n\nfirst & second", image));
        transcript.push(Message::error("Connection dropped"));
        transcript
    }

    #[test]
    fn default_name_is_dated() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(default_export_file_name(date), "tutor-chat-2026-03-09.html");
    }

    #[test]
    fn html_escapes_text_and_keeps_one_paragraph_per_line() {
        let exported_at = Local
            .with_ymd_and_hms(2026, 3, 9, 14, 5, 0)
            .single()
            .unwrap();
        let html = render_transcript_html(&sample(), exported_at);
        assert!(html.contains("Exported at 2026-03-09 14:05:00"));
        assert!(html.contains("<p>Is x &lt; 3?</p>\n    <p>&nbsp;</p>\n    <p>first &amp; second</p>"));
        assert!(html.contains(IMAGE_PLACEHOLDER));
        assert!(html.contains("Student <span class='time'>"));
        assert!(html.contains("<div class='entry tutor error'>"));
        assert_eq!(html.matches("class='sender'").count(), 3);
        assert!(html.contains("<footer>"));
    }

    #[test]
    fn export_into_directory_uses_default_name() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = export_transcript_html(&sample(), temp.path())?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        assert!(name.starts_with("tutor-chat-") && name.ends_with(".html"));
        assert!(fs::read_to_string(&path)?.contains("Hello!"));

        let explicit = temp.path().join("nested").join("chat.html");
        assert_eq!(export_transcript_html(&sample(), &explicit)?, explicit);
        assert!(explicit.exists());
        Ok(())
    }

    #[test]
    fn escape_html_covers_quotes() {
        assert_eq!(escape_html(r#"<a href="x">'"#), "&lt;a href=&quot;x&quot;&gt;&#x27;");
    }
}
