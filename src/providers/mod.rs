pub mod llm;
pub mod steps;

pub use llm::{InferenceProvider, Message, OpenAIProvider, ScriptedProvider};
pub use steps::{parse_numbered_steps, InferenceStepRetriever, StaticStepRetriever, StepRetriever};
