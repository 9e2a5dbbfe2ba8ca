//! Report-generation port and the transcript shaping shared by generators.

use async_trait::async_trait;

use crate::domain::{GroupMessage, Language};

/// Messages looked at per report.
pub const MAX_TRANSCRIPT_MESSAGES: usize = 200;
/// Lines actually placed in a prompt.
pub const MAX_PROMPT_LINES: usize = 100;
const MAX_LINE_CHARS: usize = 200;
const MIN_TEXT_CHARS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportPeriod {
    Weekly,
    Monthly,
}

impl ReportPeriod {
    pub const ALL: [ReportPeriod; 2] = [ReportPeriod::Weekly, ReportPeriod::Monthly];

    pub fn as_str(self) -> &'static str {
        match self {
            ReportPeriod::Weekly => "weekly",
            ReportPeriod::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekly" => Some(ReportPeriod::Weekly),
            "monthly" => Some(ReportPeriod::Monthly),
            _ => None,
        }
    }

    pub fn days(self) -> i64 {
        match self {
            ReportPeriod::Weekly => 7,
            ReportPeriod::Monthly => 30,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportPeriod::Weekly => "Weekly",
            ReportPeriod::Monthly => "Monthly",
        }
    }
}

/// Turns a group's recent messages into a summary.
///
/// Implementations never fail: problems come back as explanatory text.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(
        &self,
        group: &str,
        messages: &[GroupMessage],
        period: ReportPeriod,
        language: Language,
    ) -> String;
}

/// `- sender: text` lines for the messages worth analysing.
pub fn transcript_lines(messages: &[GroupMessage], language: Language) -> Vec<String> {
    let unknown = match language {
        Language::En => "Unknown",
        Language::Fa => "ناشناس",
    };
    messages
        .iter()
        .take(MAX_TRANSCRIPT_MESSAGES)
        .filter_map(|m| {
            let text = m.text.as_deref()?.trim();
            if text.chars().count() < MIN_TEXT_CHARS {
                return None;
            }
            let sender = m
                .first_name
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(m.username.as_deref().filter(|s| !s.is_empty()))
                .unwrap_or(unknown);
            let clipped: String = text.chars().take(MAX_LINE_CHARS).collect();
            Some(format!("- {sender}: {clipped}"))
        })
        .collect()
}

pub fn no_messages_notice(period: ReportPeriod, language: Language) -> String {
    match (language, period) {
        (Language::En, ReportPeriod::Weekly) => {
            "📭 No messages found in this group in the past week.".to_string()
        }
        (Language::En, ReportPeriod::Monthly) => {
            "📭 No messages found in this group in the past month.".to_string()
        }
        (Language::Fa, ReportPeriod::Weekly) => {
            "📭 هیچ پیامی در هفته گذشته در این گروه یافت نشد.".to_string()
        }
        (Language::Fa, ReportPeriod::Monthly) => {
            "📭 هیچ پیامی در ماه گذشته در این گروه یافت نشد.".to_string()
        }
    }
}

pub fn no_text_notice(language: Language) -> String {
    match language {
        Language::En => "📭 No analyzable text messages found.".to_string(),
        Language::Fa => "📭 پیام متنی قابل تحلیلی یافت نشد.".to_string(),
    }
}

/// Shown when a generator does not answer in time.
pub fn timeout_notice(language: Language) -> String {
    match language {
        Language::En => "⏳ Report generation timed out. Please try again later.".to_string(),
        Language::Fa => "⏳ تولید گزارش بیش از حد طول کشید. لطفاً بعداً دوباره تلاش کنید.".to_string(),
    }
}
