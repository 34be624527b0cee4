pub mod access_code;
pub mod dialogue;
pub mod extraction;
pub mod init;

pub use access_code::AccessCodeService;
pub use dialogue::{DialogueController, TurnOutcome};
pub use extraction::{ChatMessage, ExtractionOutcome, Extractor, OpenAiExtractor};
