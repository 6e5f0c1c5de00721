//! Prompt assembly.
//!
//! Builds the ordered message list sent to the completion provider:
//!
//! 1. **System** guidance tailored to the session's purpose, the user's
//!    experience level and any known preferences
//! 2. **Knowledge** as a second system message, only when something was
//!    retrieved
//! 3. **History**, the most recent turns, oldest first
//! 4. **User** message for this turn
//!
//! Assembly is deterministic: identical inputs give identical prompts.

use rigchat_core::knowledge::KnowledgeEntry;
use rigchat_core::message::{Message, Role};
use rigchat_core::provider::PromptMessage;
use rigchat_core::session::{ExperienceLevel, Purpose, SessionContext};
use serde_json::Value;

// ── Guidance text ─────────────────────────────────────────────────────────

const BASE_GUIDANCE: &str = "Bạn là trợ lý tư vấn máy tính của cửa hàng linh kiện PC. \
Trả lời bằng tiếng Việt, ngắn gọn, chính xác và thân thiện. \
Chỉ đưa ra thông tin kỹ thuật bạn chắc chắn; nếu không chắc, hãy nói rõ và gợi ý khách liên hệ nhân viên.";

fn purpose_guidance(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::BuildHelp => {
            "Khách đang cần tư vấn build PC. Đề xuất cấu hình theo ngân sách và nhu cầu, \
             kiểm tra tương thích giữa CPU, mainboard, RAM và nguồn."
        }
        Purpose::ProductInquiry => {
            "Khách đang hỏi về sản phẩm. Nêu thông số chính, ưu nhược điểm và so sánh với lựa chọn tương đương."
        }
        Purpose::Support => {
            "Khách đang gặp sự cố kỹ thuật. Hướng dẫn chẩn đoán từng bước, từ kiểm tra đơn giản đến phức tạp."
        }
        Purpose::General => "Hỗ trợ khách với mọi câu hỏi về máy tính và linh kiện.",
    }
}

fn experience_guidance(level: ExperienceLevel) -> &'static str {
    match level {
        ExperienceLevel::Beginner => "Khách là người mới: giải thích đơn giản, tránh thuật ngữ khó.",
        ExperienceLevel::Intermediate => "Khách có hiểu biết cơ bản: có thể dùng thuật ngữ phổ biến.",
        ExperienceLevel::Expert => "Khách am hiểu kỹ thuật: đi thẳng vào chi tiết và số liệu.",
    }
}

const KNOWLEDGE_HEADER: &str = "Thông tin tham khảo từ cơ sở kiến thức:";
const KNOWLEDGE_DELIMITER: &str = "\n\n---\n\n";

// ── Assembler ─────────────────────────────────────────────────────────────

/// Turns session context, retrieved knowledge and history into a prompt.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    history_turns: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self { history_turns: 10 }
    }
}

impl PromptAssembler {
    pub fn new(history_turns: usize) -> Self {
        Self { history_turns }
    }

    pub fn history_turns(&self) -> usize {
        self.history_turns
    }

    /// System guidance for a session.
    pub fn system_instruction(&self, context: &SessionContext) -> String {
        let mut parts = vec![
            BASE_GUIDANCE.to_string(),
            purpose_guidance(context.purpose).to_string(),
            experience_guidance(context.user_profile.experience_level).to_string(),
        ];
        let preferences = format_preferences(&context.user_profile.preferences);
        if !preferences.is_empty() {
            parts.push(format!("Thông tin khách đã cung cấp: {preferences}."));
        }
        parts.join("\n")
    }

    /// Assemble the full prompt. `history` is oldest first; only the most
    /// recent `history_turns` entries are kept.
    pub fn assemble(
        &self,
        system_instruction: &str,
        knowledge: &[KnowledgeEntry],
        history: &[Message],
        user_message: &str,
    ) -> Vec<PromptMessage> {
        let mut prompt = Vec::with_capacity(history.len().min(self.history_turns) + 3);
        prompt.push(PromptMessage::system(system_instruction));

        if !knowledge.is_empty() {
            prompt.push(PromptMessage::system(format_knowledge(knowledge)));
        }

        let skip = history.len().saturating_sub(self.history_turns);
        prompt.extend(
            history
                .iter()
                .skip(skip)
                .filter(|m| m.role != Role::System)
                .map(|m| PromptMessage::new(m.role, m.content.clone())),
        );

        prompt.push(PromptMessage::user(user_message));
        prompt
    }
}

fn format_knowledge(entries: &[KnowledgeEntry]) -> String {
    let body = entries
        .iter()
        .map(|e| format!("### {}\n{}", e.title, e.content))
        .collect::<Vec<_>>()
        .join(KNOWLEDGE_DELIMITER);
    format!("{KNOWLEDGE_HEADER}\n\n{body}")
}

/// `key: value` pairs in map order, arrays joined with commas.
fn format_preferences(preferences: &serde_json::Map<String, Value>) -> String {
    preferences
        .iter()
        .filter_map(|(key, value)| {
            let rendered = render_value(value);
            (!rendered.is_empty()).then(|| format!("{key}: {rendered}"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        // Budgets are stored as {amount, currency}
        Value::Object(map) => match (map.get("amount"), map.get("currency")) {
            (Some(amount), Some(Value::String(currency))) => format!("{amount} {currency}"),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}
