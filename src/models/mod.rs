pub mod answer;
pub mod catalog;
pub mod loaders;
pub mod question;

pub use answer::{AnswerPatch, AnswerPhase, AnswerRecord, AnswerState, SectionProgress};
pub use catalog::Catalog;
pub use loaders::{load_catalog, load_catalog_or_builtin};
pub use question::{Question, Section};
