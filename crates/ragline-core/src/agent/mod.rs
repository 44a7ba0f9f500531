//! Conversational retrieval agent
//!
//! Each turn runs a fixed workflow over the thread's history:
//! 1. Decide: the model answers directly or asks to retrieve
//! 2. Retrieve: top matches from the vector store become a tool message
//! 3. Generate: the model answers from the retrieved context

mod nodes;
mod orchestrator;
mod prompts;
mod state;

pub use nodes::{
    classify, decide_prompt, format_results, generation_prompt, recent_tool_context,
    retrieve_step, Decision, RETRIEVAL_TOP_K,
};
pub use orchestrator::{Orchestrator, TurnEvent};
pub use prompts::{answer_instruction, retrieve_tool, DECIDE_INSTRUCTION, RETRIEVE_TOOL_NAME};
pub use state::{ConversationStore, ThreadHistory};
