//! OpenAI adapter: group activity reports over the chat-completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use tsb_core::{
    domain::{GroupMessage, Language},
    errors::Error,
    report::{no_text_notice, transcript_lines, ReportGenerator, ReportPeriod, MAX_PROMPT_LINES},
    Result,
};

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.7;

#[derive(Clone, Debug)]
pub struct OpenAiReporter {
    api_key: Option<String>,
    model: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiReporter {
    /// `timeout` bounds a single HTTP exchange; the engine applies its own
    /// deadline on top.
    pub fn new(api_key: Option<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("openai client build error: {e}")))?;
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            http,
        })
    }

    async fn complete(&self, api_key: &str, body: &serde_json::Value) -> Result<String> {
        let resp = self
            .http
            .post(COMPLETIONS_URL)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "openai completion failed: {status} {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let completion: Completion = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::External("openai returned no content".to_string()))
    }
}

#[async_trait]
impl ReportGenerator for OpenAiReporter {
    async fn generate(
        &self,
        group: &str,
        messages: &[GroupMessage],
        period: ReportPeriod,
        language: Language,
    ) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            return missing_key_notice(language);
        };

        let lines = transcript_lines(messages, language);
        if lines.is_empty() {
            return no_text_notice(language);
        }

        let body = request_body(&self.model, group, &lines, messages.len(), period, language);
        debug!(group, lines = lines.len(), model = %self.model, "requesting report");
        match self.complete(api_key, &body).await {
            Ok(report) => report,
            Err(e) => {
                error!(group, error = %e, "report generation failed");
                failure_notice(language)
            }
        }
    }
}

fn request_body(
    model: &str,
    group: &str,
    lines: &[String],
    total: usize,
    period: ReportPeriod,
    language: Language,
) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_prompt(language) },
            { "role": "user", "content": user_prompt(group, lines, total, period, language) },
        ],
        "max_tokens": MAX_TOKENS,
        "temperature": TEMPERATURE,
    })
}

fn system_prompt(language: Language) -> &'static str {
    match language {
        Language::En => "You are a professional Telegram group analyst who provides concise and useful reports in English.",
        Language::Fa => "شما یک تحلیلگر حرفه‌ای گروه‌های تلگرامی هستید که گزارش‌های خلاصه و کاربردی به زبان فارسی ارائه می‌دهید.",
    }
}

fn user_prompt(
    group: &str,
    lines: &[String],
    total: usize,
    period: ReportPeriod,
    language: Language,
) -> String {
    let transcript = lines
        .iter()
        .take(MAX_PROMPT_LINES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");

    match language {
        Language::En => {
            let span = match period {
                ReportPeriod::Weekly => "past week",
                ReportPeriod::Monthly => "past month",
            };
            format!(
                "Analyze the following messages from the Telegram group \"{group}\" from the {span} \
                 and write a concise, useful summary report in English.\n\n\
                 Cover:\n\
                 1. 📌 Overall activity\n\
                 2. 🔥 Frequent topics\n\
                 3. 👥 Interaction and participation\n\
                 4. 💡 Key points\n\
                 5. 📊 Statistics (message count: {total})\n\n\
                 Messages:\n{transcript}\n\n\
                 Keep it short and readable (at most 500 words)."
            )
        }
        Language::Fa => {
            let span = match period {
                ReportPeriod::Weekly => "هفته گذشته",
                ReportPeriod::Monthly => "ماه گذشته",
            };
            format!(
                "پیام‌های زیر از گروه تلگرامی «{group}» در {span} را تحلیل کنید و یک گزارش خلاصه و کاربردی به فارسی بنویسید.\n\n\
                 گزارش شامل این موارد باشد:\n\
                 1. 📌 خلاصه کلی فعالیت\n\
                 2. 🔥 موضوعات پرتکرار\n\
                 3. 👥 میزان تعامل و مشارکت\n\
                 4. 💡 نکات کلیدی\n\
                 5. 📊 آمار کلی (تعداد پیام: {total})\n\n\
                 پیام‌ها:\n{transcript}\n\n\
                 گزارش را کوتاه و خوانا بنویسید (حداکثر ۵۰۰ کلمه)."
            )
        }
    }
}

fn missing_key_notice(language: Language) -> String {
    match language {
        Language::En => "⚠️ The report service is not configured.".to_string(),
        Language::Fa => "⚠️ کلید API هوش مصنوعی تنظیم نشده است.".to_string(),
    }
}

fn failure_notice(language: Language) -> String {
    match language {
        Language::En => "❌ Could not generate the report. Please try again.".to_string(),
        Language::Fa => "❌ خطا در تولید گزارش. لطفاً دوباره تلاش کنید.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn msg(text: &str) -> GroupMessage {
        GroupMessage {
            text: Some(text.to_string()),
            first_name: Some("Ann".into()),
            username: None,
            date: Utc::now(),
        }
    }

    #[test]
    fn body_carries_model_and_sampling() {
        let lines = vec!["- Ann: release is out".to_string()];
        let body = request_body("gpt-4o-mini", "Ops", &lines, 3, ReportPeriod::Weekly, Language::En);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("\"Ops\""));
        assert!(user.contains("past week"));
        assert!(user.contains("message count: 3"));
        assert!(user.contains("- Ann: release is out"));
    }

    #[test]
    fn prompt_keeps_at_most_the_line_cap() {
        let lines: Vec<String> = (0..150).map(|i| format!("- A: line number {i}")).collect();
        let prompt = user_prompt("Ops", &lines, 150, ReportPeriod::Monthly, Language::Fa);
        assert!(prompt.contains("line number 99"));
        assert!(!prompt.contains("line number 100"));
        assert!(prompt.contains("ماه گذشته"));
    }

    #[tokio::test]
    async fn missing_key_is_reported_as_text() {
        let r = OpenAiReporter::new(None, "gpt-4o-mini", Duration::from_secs(1)).unwrap();
        let out = r
            .generate("Ops", &[msg("something happened")], ReportPeriod::Weekly, Language::En)
            .await;
        assert_eq!(out, missing_key_notice(Language::En));
    }

    #[tokio::test]
    async fn short_messages_only_yield_no_text_notice() {
        let r = OpenAiReporter::new(Some("sk-test".into()), "m", Duration::from_secs(1)).unwrap();
        let out = r
            .generate("Ops", &[msg("ok"), msg("hi")], ReportPeriod::Weekly, Language::Fa)
            .await;
        assert_eq!(out, no_text_notice(Language::Fa));
    }
}
