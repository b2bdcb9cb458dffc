pub mod engine;
pub mod evaluator;
pub mod fence;
pub mod generator;
pub mod language;
pub mod process;
pub mod provider;
pub mod remote;
pub mod repair;
pub mod workspace;


pub use engine::LocalEngine;
pub use generator::{CodeGenerator, OllamaGenerator};
pub use language::LanguageConfigManager;
pub use provider::ExecutionProvider;
pub use remote::RemoteSandbox;
pub use repair::RepairLoop;
