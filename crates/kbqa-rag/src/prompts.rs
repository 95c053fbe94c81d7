//! Prompt templates and fixed replies

/// Returned when the model says `final` without an answer
pub const EMPTY_ANSWER_PLACEHOLDER: &str = "（未生成答案）";

/// Returned when synthesis fails or the model returns nothing
pub const INSUFFICIENT_ANSWER: &str =
    "抱歉，目前无法根据检索到的内容给出可靠回答：缺少与该问题直接相关的资料，或语言模型暂时不可用。";

/// Single-shot answer when retrieval found nothing
pub const NO_DOCUMENTS_ANSWER: &str =
    "我没有检索到相关文档，所以无法回答该问题。请检查文档是否已建立索引。";

/// Round judgment: the model must reply with a bare JSON decision
pub fn decision_prompt(question: &str, context: &str) -> String {
    format!(
        "你是一个严谨的 RAG 助手，负责决定是否需要继续检索。\n\
         你必须只输出 JSON（不要 Markdown），格式如下：\n\
         {{\"status\":\"final\"|\"need_more\",\"next_query\":\"...\",\"answer\":\"...\"}}\n\n\
         规则：\n\
         - 如果当前检索内容已足够给出清晰定义/解释，则 status=final，并在 answer 给出最终回答。\n\
         - 如果内容不足，但提到了可能相关的关键词/短语，则 status=need_more，next_query 给出下一次更具体的检索词。\n\
         - next_query 必须是简短的中文检索短语（<=20字），不要带引号。\n\n\
         用户问题：{question}\n\n\
         当前检索内容：\n{context}\n"
    )
}

/// Plain answer over the context, used when a decision could not be obtained
pub fn fallback_prompt(question: &str, context: &str) -> String {
    format!(
        "请依据以下检索内容回答问题，中文简洁回答。\n\n\
         检索内容：\n{context}\n\n问题：{question}"
    )
}

/// Best-effort answer after the rounds ran out
pub fn final_prompt(question: &str, context: &str) -> String {
    format!(
        "请依据以下检索内容回答问题；若内容不足，请说明缺少哪一类信息。\n\n\
         检索内容：\n{context}\n\n问题：{question}"
    )
}

/// One retrieval, one answer
pub fn single_shot_prompt(question: &str, context: &str) -> String {
    format!(
        "你是知识助手。请依据检索到的内容作答，中文回答。\n\
         检索内容：\n{context}\n\n问题：{question}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_prompt_embeds_question_and_context() {
        let prompt = decision_prompt("什么是混淆电路？", "[1] source=gc.pdf page=1\nYao");
        assert!(prompt.contains("用户问题：什么是混淆电路？"));
        assert!(prompt.ends_with("当前检索内容：\n[1] source=gc.pdf page=1\nYao\n"));
        assert!(prompt.contains(r#"{"status":"final"|"need_more","next_query":"...","answer":"..."}"#));
    }

    #[test]
    fn test_final_prompt_asks_for_missing_category() {
        insta::assert_snapshot!(final_prompt("Q", "C"), @r###"
        请依据以下检索内容回答问题；若内容不足，请说明缺少哪一类信息。

        检索内容：
        C

        问题：Q
        "###);
    }
}
