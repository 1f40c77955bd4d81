//! 답변 생성 모듈 - 검색된 컨텍스트로 LLM 답변 생성
//!
//! - `GeminiGenerator`: Gemini generateContent API
//! - `build_prompt`: 번호가 붙은 컨텍스트 블록으로 프롬프트 조립

mod gemini;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use gemini::GeminiGenerator;

use crate::embedding::has_api_key;

// ============================================================================
// Generator Trait
// ============================================================================

/// 텍스트 생성기 트레이트
#[async_trait]
pub trait Generator: Send + Sync {
    /// 프롬프트로 답변 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// 답변 생성기 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum GeneratorKind {
    /// 생성 비활성화 (검색만 제공)
    #[default]
    None,
    /// Google Gemini API
    Gemini,
}

/// 설정에 맞는 생성기 생성 (`None`이면 생성 기능 비활성화)
pub fn create_generator(kind: GeneratorKind) -> Result<Option<Arc<dyn Generator>>> {
    match kind {
        GeneratorKind::None => Ok(None),
        GeneratorKind::Gemini => {
            if !has_api_key() {
                anyhow::bail!(
                    "GEMINI_API_KEY or GOOGLE_AI_API_KEY not set.\n\
                     Set: export GEMINI_API_KEY=your-api-key\n\
                     Or run with --generator none to disable answers."
                );
            }
            let generator = GeminiGenerator::from_env()?;
            tracing::info!("Using {} for answers", generator.name());
            Ok(Some(Arc::new(generator)))
        }
    }
}

// ============================================================================
// Prompt
// ============================================================================

/// 컨텍스트 기반 답변 프롬프트
///
/// 컨텍스트가 없으면 모른다고 답하도록 지시합니다.
pub fn build_prompt(question: &str, contexts: &[String]) -> String {
    let mut prompt = String::from(
        "You answer questions about entries stored in a personal vault.\n\
         Use only the context blocks below. If they do not contain the answer, \
         say that you could not find it. Refer to entries by their title.\n\n",
    );

    if contexts.is_empty() {
        prompt.push_str("Context: (no matching entries)\n\n");
    } else {
        for (i, context) in contexts.iter().enumerate() {
            prompt.push_str(&format!("[{}]\n{}\n\n", i + 1, context.trim()));
        }
    }

    prompt.push_str(&format!("Question: {}\nAnswer:", question.trim()));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_numbers_contexts() {
        let prompt = build_prompt(
            " where is the db password? ",
            &["Title: DB\n".to_string(), "Title: Wiki".to_string()],
        );
        assert!(prompt.contains("[1]\nTitle: DB\n"));
        assert!(prompt.contains("[2]\nTitle: Wiki\n"));
        assert!(prompt.ends_with("Question: where is the db password?\nAnswer:"));
    }

    #[test]
    fn test_prompt_without_context() {
        let prompt = build_prompt("anything", &[]);
        assert!(prompt.contains("no matching entries"));
        assert!(!prompt.contains("[1]"));
    }

    #[test]
    fn test_no_generator() {
        assert!(create_generator(GeneratorKind::None).unwrap().is_none());
    }
}
