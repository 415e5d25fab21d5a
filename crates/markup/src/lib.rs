//! Markup-safe rendering for chat transports.
//!
//! Generated text goes through [`extract_attachments`] (oversized code
//! blocks become files), [`render`] (escaping into the markup dialect),
//! [`split`] (frames that fit the transport ceiling, repaired so each is
//! well-formed on its own) and, when the transport rejects a frame,
//! [`degrade`] through the fallback [`Stage`]s.

pub mod attach;
pub mod escape;
pub mod fallback;
pub mod render;
pub mod scan;
pub mod split;
pub mod tokenize;

pub use attach::{extract_attachments, guess_extension, Attachment, Extracted, PLACEHOLDER};
pub use fallback::{degrade, plain_text, Stage};
pub use render::{normalize_whitespace, render, strip_think};
pub use split::{split, Frame, REPAIR_RESERVE};
