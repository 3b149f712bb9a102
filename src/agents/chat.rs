//! Chat agent: direct LLM answer for the `chat_only` route.

use crate::agents::types::{AgentResponse, ConversationTurn};
use crate::llm::{CompletionFormat, LlmClient, Message};

const CHAT_SYSTEM_PROMPT: &str = "\
당신은 친절한 한국어 어시스턴트입니다. 도구 없이 알고 있는 지식으로 간결하게 \
답변하세요.";

pub async fn run(
    llm: &dyn LlmClient,
    prompt: &str,
    conversation: &[ConversationTurn],
) -> AgentResponse {
    let mut messages = vec![Message::system(CHAT_SYSTEM_PROMPT)];
    for turn in conversation {
        messages.push(if turn.role == "assistant" {
            Message::assistant(turn.text.clone())
        } else {
            Message::user(turn.text.clone())
        });
    }
    messages.push(Message::user(prompt));

    match llm.complete(&messages, CompletionFormat::Text).await {
        Ok(answer) => AgentResponse::chat_only(answer),
        Err(e) => {
            log::warn!("[CHAT] completion failed: {}", e);
            AgentResponse::chat_only(
                "죄송합니다. 지금은 답변을 생성하지 못했습니다. 잠시 후 다시 시도해주세요."
                    .to_string(),
            )
        }
    }
}
