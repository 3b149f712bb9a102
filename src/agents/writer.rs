//! Writer/evaluator polishing pass applied to every final answer.
//!
//! A fixed two-round loop: draft, judge, and at most one revision with the
//! judge's feedback. The second draft ships regardless of its verdict, so the
//! polishing phase never exceeds four LLM calls.

use serde_json::Value;

use crate::agents::types::{AgentResponse, QualityCheck};
use crate::llm::{extract_json_object, CompletionFormat, LlmClient, Message};

const WRITER_SYSTEM_PROMPT: &str = "\
당신은 최종 답변 작성자입니다. 도구 이름, 파일 경로, 디버그 정보는 숨기고 \
사용자에게 필요한 내용만 간결한 한국어로 다시 작성하세요. 마크다운 구조는 \
유지해도 됩니다.";

const EVALUATOR_SYSTEM_PROMPT: &str = "\
당신은 답변 품질 심사자입니다. 사용자 질문과 후보 답변을 보고 JSON으로만 \
응답하세요: {\"pass\": true|false, \"score\": 0-100, \"feedback\": \"<개선점>\"}";

/// Rewrite the draft answer for the user, optionally applying judge feedback.
async fn draft(
    llm: &dyn LlmClient,
    prompt: &str,
    current: &str,
    feedback: Option<&str>,
) -> Option<String> {
    let mut user = format!("사용자 질문: {}\n\n현재 답변 초안:\n{}", prompt, current);
    if let Some(feedback) = feedback {
        user.push_str(&format!("\n\n심사자 피드백:\n{}", feedback));
    }
    let messages = vec![Message::system(WRITER_SYSTEM_PROMPT), Message::user(user)];
    match llm.complete(&messages, CompletionFormat::Text).await {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            log::warn!("[WRITER] draft failed: {}", e);
            None
        }
    }
}

/// Judge a candidate answer. Defensive parse; any failure is a lenient pass.
async fn evaluate(llm: &dyn LlmClient, prompt: &str, candidate: &str) -> QualityCheck {
    let user = format!("사용자 질문: {}\n\n후보 답변:\n{}", prompt, candidate);
    let messages = vec![Message::system(EVALUATOR_SYSTEM_PROMPT), Message::user(user)];
    let raw = match llm.complete(&messages, CompletionFormat::Json).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("[WRITER] evaluator failed: {}", e);
            return QualityCheck::lenient();
        }
    };
    let Some(parsed) = extract_json_object(&raw) else {
        return QualityCheck::lenient();
    };

    let pass = parsed.get("pass").and_then(Value::as_bool).unwrap_or(true);
    let score = parsed
        .get("score")
        .and_then(Value::as_f64)
        .map(|s| s.clamp(0.0, 100.0) as u8)
        .unwrap_or(80);
    let feedback = parsed
        .get("feedback")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    QualityCheck {
        pass,
        score,
        feedback,
    }
}

/// Polish the response answer in place and attach the quality verdict.
pub async fn polish(llm: &dyn LlmClient, prompt: &str, response: &mut AgentResponse) {
    let Some(first) = draft(llm, prompt, &response.answer, None).await else {
        response.quality_check = Some(QualityCheck::lenient());
        return;
    };

    let verdict = evaluate(llm, prompt, &first).await;
    if verdict.pass {
        response.answer = first;
        response.quality_check = Some(verdict);
        return;
    }

    match draft(llm, prompt, &first, Some(&verdict.feedback)).await {
        Some(second) => {
            let final_verdict = evaluate(llm, prompt, &second).await;
            response.answer = second;
            response.quality_check = Some(final_verdict);
        }
        None => {
            response.answer = first;
            response.quality_check = Some(verdict);
        }
    }
}
