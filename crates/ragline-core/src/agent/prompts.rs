//! Fixed instructions and the retrieval tool schema

use crate::llm::ToolSpec;

/// Name of the single tool offered to the model
pub const RETRIEVE_TOOL_NAME: &str = "retrieve";

/// System instruction for the decide step
pub const DECIDE_INSTRUCTION: &str = "You are an assistant specializing in labor and employment information. \
For ANY query related to labor, workers, blue collar jobs, employment law, \
labor contacts, unions, workplace regulations, employee rights, wages, \
employment benefits, job safety, industrial relations, labor statistics, \
workforce development, or legal documents about employment - \
you MUST ALWAYS use the retrieve function first. \
This is critical as your knowledge base contains specialized and up-to-date \
information on these topics that will provide users with accurate information. \
After retrieving information, base your response primarily on the retrieved content. \
For other topics, you can answer directly if appropriate.";

const ANSWER_INSTRUCTION: &str = "Use the following pieces of retrieved context to answer \
the question. If you don't see the answer in the provided context below, just say that you \
don't have information about the question. Provide a comprehensive answer if the context is large \
\n\n";

/// System instruction for the generate step with `context` appended
pub fn answer_instruction(context: &str) -> String {
    format!("{}{}", ANSWER_INSTRUCTION, context)
}

/// `retrieve(query: string)` tool definition
pub fn retrieve_tool() -> ToolSpec {
    ToolSpec {
        name: RETRIEVE_TOOL_NAME.to_string(),
        description: "Retrieve information related to a query.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"]
        }),
    }
}
