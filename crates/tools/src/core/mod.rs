//! Core Generation Tools — the concrete tool set the agentic
//! loop registers for every Run: brief analysis, design system, page
//! authoring, validation, style extraction, batch writes, and the
//! `ask_user` suspension sentinel.

mod analyze_brief;
mod ask_user;
mod batch_write;
pub mod checks;
mod design_system;
mod extract_style;
mod pages;
mod validate;

use std::sync::Arc;

use crate::registry::ToolRegistry;

pub use analyze_brief::AnalyzeBrief;
pub use ask_user::AskUser;
pub use batch_write::BatchFileWrite;
pub use design_system::CreateDesignSystem;
pub use extract_style::ExtractStyle;
pub use pages::{EditPage, GeneratePage, ListPages, ReadPage};
pub use validate::ValidateHtml;

/// Build a [`ToolRegistry`] populated with the full Core Generation Tools
/// set. The loop registers exactly this set for every Run — there is no
/// per-session or per-product-type subset.
pub fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AnalyzeBrief));
    registry.register(Arc::new(CreateDesignSystem));
    registry.register(Arc::new(GeneratePage));
    registry.register(Arc::new(EditPage));
    registry.register(Arc::new(ReadPage));
    registry.register(Arc::new(ListPages));
    registry.register(Arc::new(ValidateHtml));
    registry.register(Arc::new(ExtractStyle));
    registry.register(Arc::new(BatchFileWrite));
    registry.register(Arc::new(AskUser));
    registry
}
