pub mod fallback;
pub mod gemini;
pub mod ocr;
pub mod traits;

pub use fallback::{FallbackReason, ModelClient, RawModelOutput, ResponseSimulator};
pub use gemini::GeminiBackend;
pub use ocr::{OcrEngine, OcrError, TesseractCli};
pub use traits::{GenerateRequest, InlineImage, ModelBackend, ModelError, ModelReply};
