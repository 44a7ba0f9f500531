//! Decide → Retrieve → Generate turn driver

use super::nodes::{
    classify, decide_prompt, generation_prompt, retrieve_step, unanswered_calls, Decision,
};
use super::prompts::retrieve_tool;
use super::state::ConversationStore;
use crate::error::{RaglineError, Result};
use crate::llm::{ChatModel, Content, DeltaAccumulator, Message, ToolSpec};
use crate::store::Retriever;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Event emitted while a streamed turn runs
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Assistant content as it arrives from the model
    Fragment(Content),
    /// The turn completed with this final message
    Finished(Message),
}

type EventSender = mpsc::UnboundedSender<Result<TurnEvent>>;

/// Runs conversation turns against a chat model and a retriever
///
/// A turn works on a copy of the thread's history and commits it only when
/// every step succeeded; a failed or cancelled turn leaves the thread as it
/// was.
pub struct Orchestrator {
    chat: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
    conversations: ConversationStore,
}

impl Orchestrator {
    pub fn new(chat: Arc<dyn ChatModel>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            chat,
            retriever,
            conversations: ConversationStore::new(),
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Messages stored for `thread_id`
    pub async fn history(&self, thread_id: &str) -> Vec<Message> {
        self.conversations.history(thread_id).await
    }

    /// Run one turn and return the final assistant message
    pub async fn run_turn(&self, thread_id: &str, prompt: &str) -> Result<Message> {
        self.turn(thread_id, prompt, None).await
    }

    /// Run one turn with streamed model calls
    ///
    /// The turn runs on a spawned task. Dropping the returned stream cancels
    /// it at the next fragment.
    pub fn stream_turn(
        self: Arc<Self>,
        thread_id: &str,
        prompt: &str,
    ) -> impl Stream<Item = Result<TurnEvent>> + Send + Unpin + 'static {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread_id = thread_id.to_string();
        let prompt = prompt.to_string();

        tokio::spawn(async move {
            match self.turn(&thread_id, &prompt, Some(&tx)).await {
                Ok(message) => {
                    let _ = tx.send(Ok(TurnEvent::Finished(message)));
                }
                Err(RaglineError::Cancelled(reason)) => {
                    tracing::debug!(thread_id = %thread_id, "Streamed turn cancelled: {}", reason);
                }
                Err(e) => {
                    tracing::error!(thread_id = %thread_id, "Streamed turn failed: {}", e);
                    let _ = tx.send(Err(e));
                }
            }
        });

        UnboundedReceiverStream::new(rx)
    }

    async fn turn(
        &self,
        thread_id: &str,
        prompt: &str,
        events: Option<&EventSender>,
    ) -> Result<Message> {
        if thread_id.trim().is_empty() {
            return Err(RaglineError::InvalidInput("thread_id is required".to_string()));
        }

        let thread = self.conversations.thread(thread_id);
        let mut history = thread.lock().await;

        let mut working = history.clone();
        working.push(Message::user(prompt));
        let answer = self.drive(&mut working, events).await?;
        *history = working;

        tracing::debug!(thread_id = %thread_id, messages = history.len(), "Turn committed");
        Ok(answer)
    }

    async fn drive(&self, history: &mut Vec<Message>, events: Option<&EventSender>) -> Result<Message> {
        let reply = self
            .invoke(&decide_prompt(history), &[retrieve_tool()], events)
            .await?;

        let (call, query) = match classify(&reply) {
            Decision::Answer(mut message) => {
                if message.has_tool_calls() {
                    tracing::warn!(
                        "Dropping {} unsupported tool call(s) from answer",
                        message.tool_calls.len()
                    );
                    message.tool_calls.clear();
                }
                history.push(message.clone());
                return Ok(message);
            }
            Decision::Retrieve { call, query } => (call, query),
        };

        let unanswered = unanswered_calls(&reply, &call);
        history.push(reply);
        history.push(retrieve_step(self.retriever.as_ref(), &call, query.as_deref()).await?);
        history.extend(unanswered);

        let answer = self.invoke(&generation_prompt(history), &[], events).await?;
        history.push(answer.clone());
        Ok(answer)
    }

    /// Call the model, streaming content to `events` when present
    async fn invoke(
        &self,
        prompt: &[Message],
        tools: &[ToolSpec],
        events: Option<&EventSender>,
    ) -> Result<Message> {
        let Some(events) = events else {
            return self.chat.complete(prompt, tools).await;
        };

        let mut stream = self.chat.stream(prompt, tools).await?;
        let mut accumulator = DeltaAccumulator::new();
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            if let Some(content) = delta.content.as_ref().filter(|c| !c.is_empty()) {
                events
                    .send(Ok(TurnEvent::Fragment(content.clone())))
                    .map_err(|_| RaglineError::Cancelled("client went away".to_string()))?;
            }
            accumulator.push(&delta);
        }
        Ok(accumulator.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, ToolCall};
    use crate::store::ScoredChunk;
    use crate::testing::{ScriptedChatModel, ScriptedReply};
    use async_trait::async_trait;

    struct NoRetriever;

    #[async_trait]
    impl Retriever for NoRetriever {
        async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }
    }

    fn orchestrator(model: Arc<ScriptedChatModel>) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(model, Arc::new(NoRetriever)))
    }

    #[tokio::test]
    async fn test_direct_answer_skips_retrieval() {
        let model = Arc::new(ScriptedChatModel::new());
        model.reply_text("Hi there!");
        let orch = orchestrator(model.clone());

        let answer = orch.run_turn("t1", "hello").await.unwrap();
        assert_eq!(answer.text(), "Hi there!");
        assert_eq!(model.calls().len(), 1);
        assert_eq!(model.calls()[0].tools, vec!["retrieve"]);

        let history = orch.history("t1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_empty_retrieval_still_generates() {
        let model = Arc::new(ScriptedChatModel::new());
        model.reply_retrieve("overtime pay");
        model.reply_text("I don't have information about that.");
        let orch = orchestrator(model.clone());

        let answer = orch.run_turn("t1", "What about overtime pay?").await.unwrap();
        assert_eq!(answer.text(), "I don't have information about that.");

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].tools.is_empty());
        assert!(calls[1].messages[0].text().ends_with("large \n\n"));
        assert_eq!(orch.history("t1").await.len(), 4);
    }

    #[tokio::test]
    async fn test_extra_tool_calls_are_answered_and_reach_generation() {
        let model = Arc::new(ScriptedChatModel::new());
        model.push(ScriptedReply::Reply(Message::assistant_tool_calls(
            "",
            vec![
                ToolCall {
                    id: "call_web".to_string(),
                    name: "search_web".to_string(),
                    arguments: serde_json::json!({"q": "overtime"}),
                },
                ToolCall {
                    id: "call_kb".to_string(),
                    name: "retrieve".to_string(),
                    arguments: serde_json::json!({"query": "overtime"}),
                },
            ],
        )));
        model.reply_text("Overtime is paid at time and a half.");
        let orch = orchestrator(model.clone());

        orch.run_turn("t1", "How is overtime paid?").await.unwrap();

        let history = orch.history("t1").await;
        assert_eq!(history.len(), 5);
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_kb"));
        assert_eq!(history[3].role, Role::Tool);
        assert_eq!(history[3].tool_call_id.as_deref(), Some("call_web"));
        assert_eq!(
            history[3].text(),
            "Error: search_web is not a valid tool call here."
        );

        let generate = &model.calls()[1];
        assert!(generate.tools.is_empty());
        assert!(generate.messages[0]
            .text()
            .contains("Error: search_web is not a valid tool call here."));
        assert!(generate.messages.iter().all(|m| m.role != Role::Tool));
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_history_untouched() {
        let model = Arc::new(ScriptedChatModel::new());
        model.reply_text("first");
        model.fail("model unavailable");
        let orch = orchestrator(model.clone());

        orch.run_turn("t1", "one").await.unwrap();
        let err = orch.run_turn("t1", "two").await.unwrap_err();
        assert!(err.to_string().contains("model unavailable"));
        assert_eq!(orch.history("t1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_thread_rejected() {
        let orch = orchestrator(Arc::new(ScriptedChatModel::new()));
        let err = orch.run_turn("  ", "hello").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_stream_turn_emits_fragments_then_finished() {
        let model = Arc::new(ScriptedChatModel::new());
        model.reply_text("Streaming works fine");
        let orch = orchestrator(model.clone());

        let events: Vec<_> = orch.clone().stream_turn("s1", "hi").collect().await;
        let mut text = String::new();
        for event in &events[..events.len() - 1] {
            match event {
                Ok(TurnEvent::Fragment(content)) => text.push_str(&content.text()),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(text, "Streaming works fine");
        assert!(matches!(events.last(), Some(Ok(TurnEvent::Finished(m))) if m.text() == text));
        assert!(model.calls()[0].streamed);
        assert_eq!(orch.history("s1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_turn_reports_failure() {
        let model = Arc::new(ScriptedChatModel::new());
        model.push(ScriptedReply::Interrupted {
            partial: "Half an ".to_string(),
            error: "connection reset".to_string(),
        });
        let orch = orchestrator(model);

        let events: Vec<_> = orch.clone().stream_turn("s1", "hi").collect().await;
        assert!(matches!(events.first(), Some(Ok(TurnEvent::Fragment(_)))));
        match events.last() {
            Some(Err(e)) => assert!(e.to_string().contains("connection reset")),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(orch.history("s1").await.is_empty());
    }
}
