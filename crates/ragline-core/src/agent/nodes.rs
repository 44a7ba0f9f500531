//! Decide, retrieve and generate steps

use super::prompts::{answer_instruction, DECIDE_INSTRUCTION, RETRIEVE_TOOL_NAME};
use crate::error::Result;
use crate::llm::{Message, Role, ToolCall};
use crate::store::{Retriever, ScoredChunk};

/// Number of chunks fetched per retrieval
pub const RETRIEVAL_TOP_K: usize = 4;

/// Outcome of the decide step
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The reply is final
    Answer(Message),
    /// The model asked for retrieval; `query` is `None` when the arguments
    /// carry no usable query string
    Retrieve { call: ToolCall, query: Option<String> },
}

/// Classify a decide-step reply
pub fn classify(reply: &Message) -> Decision {
    match reply
        .tool_calls
        .iter()
        .find(|call| call.name == RETRIEVE_TOOL_NAME)
    {
        Some(call) => Decision::Retrieve {
            call: call.clone(),
            query: call
                .arguments
                .get("query")
                .and_then(|q| q.as_str())
                .map(|q| q.to_string()),
        },
        None => Decision::Answer(reply.clone()),
    }
}

/// Prompt for the decide step: instruction followed by the full history
pub fn decide_prompt(history: &[Message]) -> Vec<Message> {
    let mut prompt = Vec::with_capacity(history.len() + 1);
    prompt.push(Message::system(DECIDE_INSTRUCTION));
    prompt.extend(history.iter().cloned());
    prompt
}

/// Render retrieved chunks the way the model sees them
pub fn format_results(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .map(|r| format!("Source: {}\nContent: {}", r.chunk.metadata(), r.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Run retrieval for one tool call and wrap the result as a tool message
///
/// A call without a usable query is answered with an error message so the
/// conversation stays well formed; retriever failures propagate.
pub async fn retrieve_step(
    retriever: &dyn Retriever,
    call: &ToolCall,
    query: Option<&str>,
) -> Result<Message> {
    let Some(query) = query else {
        tracing::warn!(call_id = %call.id, "Retrieve call without a query string");
        return Ok(Message::tool(
            call.id.clone(),
            format!(
                "Error: {} requires a string `query` argument, got {}",
                RETRIEVE_TOOL_NAME, call.arguments
            ),
        ));
    };

    let results = retriever.retrieve(query, RETRIEVAL_TOP_K).await?;
    tracing::info!(query = %query, hits = results.len(), "Retrieved context");
    Ok(Message::tool(call.id.clone(), format_results(&results)))
}

/// Answer tool calls that will not be executed so every call has a reply
pub fn unanswered_calls(reply: &Message, executed: &ToolCall) -> Vec<Message> {
    reply
        .tool_calls
        .iter()
        .filter(|call| call.id != executed.id)
        .map(|call| {
            Message::tool(
                call.id.clone(),
                format!("Error: {} is not a valid tool call here.", call.name),
            )
        })
        .collect()
}

/// Contents of the trailing run of tool messages, oldest first
pub fn recent_tool_context(history: &[Message]) -> String {
    let mut recent: Vec<&Message> = history
        .iter()
        .rev()
        .take_while(|m| m.is_tool_result())
        .collect();
    recent.reverse();
    recent
        .iter()
        .map(|m| m.text())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prompt for the generate step
///
/// Tool messages and tool-calling assistant messages are left out; the
/// retrieved context travels in the leading system message instead.
pub fn generation_prompt(history: &[Message]) -> Vec<Message> {
    let mut prompt = vec![Message::system(answer_instruction(&recent_tool_context(
        history,
    )))];
    prompt.extend(
        history
            .iter()
            .filter(|m| match m.role {
                Role::User | Role::System => true,
                Role::Assistant => !m.has_tool_calls(),
                Role::Tool => false,
            })
            .cloned(),
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentChunk;
    use async_trait::async_trait;

    fn retrieve_call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: "retrieve".into(),
            arguments: args,
        }
    }

    struct FixedRetriever(Vec<ScoredChunk>);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    #[test]
    fn test_classify_answer_and_retrieve() {
        let answer = Message::assistant("Hello!");
        assert_eq!(classify(&answer), Decision::Answer(answer.clone()));

        let reply = Message::assistant_tool_calls(
            "",
            vec![retrieve_call(serde_json::json!({"query": "wages"}))],
        );
        match classify(&reply) {
            Decision::Retrieve { call, query } => {
                assert_eq!(call.id, "call_1");
                assert_eq!(query.as_deref(), Some("wages"));
            }
            other => panic!("expected retrieve, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_other_tool_is_answer() {
        let reply = Message::assistant_tool_calls(
            "",
            vec![ToolCall {
                id: "x".into(),
                name: "search_web".into(),
                arguments: serde_json::json!({}),
            }],
        );
        assert!(matches!(classify(&reply), Decision::Answer(_)));
    }

    #[tokio::test]
    async fn test_retrieve_step_serializes_results() {
        let retriever = FixedRetriever(vec![
            ScoredChunk {
                chunk: DocumentChunk::on_page("data/a.pdf", Some(2), 0, "Alpha"),
                score: 0.9,
            },
            ScoredChunk {
                chunk: DocumentChunk::new("data/b.txt", 500, "Beta"),
                score: 0.5,
            },
        ]);
        let call = retrieve_call(serde_json::json!({"query": "q"}));
        let message = retrieve_step(&retriever, &call, Some("q")).await.unwrap();

        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(
            message.text(),
            "Source: {\"page\":2,\"source\":\"data/a.pdf\",\"start_index\":0}\nContent: Alpha\n\n\
             Source: {\"source\":\"data/b.txt\",\"start_index\":500}\nContent: Beta"
        );
    }

    #[tokio::test]
    async fn test_retrieve_step_without_query() {
        let retriever = FixedRetriever(Vec::new());
        let call = retrieve_call(serde_json::json!({"q": 1}));
        let message = retrieve_step(&retriever, &call, None).await.unwrap();
        assert!(message.text().starts_with("Error:"));
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_recent_tool_context_takes_trailing_run() {
        let history = vec![
            Message::user("q1"),
            Message::tool("old", "stale"),
            Message::assistant("a1"),
            Message::assistant_tool_calls("", vec![retrieve_call(serde_json::json!({}))]),
            Message::tool("c1", "first"),
            Message::tool("c2", "second"),
        ];
        assert_eq!(recent_tool_context(&history), "first\n\nsecond");
        assert_eq!(recent_tool_context(&[Message::user("x")]), "");
    }

    #[test]
    fn test_generation_prompt_filters_history() {
        let history = vec![
            Message::user("Who is the Founding Titan?"),
            Message::assistant_tool_calls(
                "",
                vec![retrieve_call(serde_json::json!({"query": "Founding Titan"}))],
            ),
            Message::tool("call_1", "Source: {}\nContent: Ymir"),
        ];
        let prompt = generation_prompt(&history);
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].role, Role::System);
        assert!(prompt[0].text().ends_with("Content: Ymir"));
        assert_eq!(prompt[1].text(), "Who is the Founding Titan?");
    }

    #[test]
    fn test_decide_prompt_prepends_instruction() {
        let prompt = decide_prompt(&[Message::user("hi")]);
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].text(), DECIDE_INSTRUCTION);
    }
}
