//! Pipeline stages for splitting a PDF into size-bounded shards.
//!
//! Each submodule implements exactly one transformation step, and each stage
//! finishes before the next one starts.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ assemble ──▶ split
//! (path)    (pdfium,    (lopdf,      (lopdf,
//!            JPEG)       1 PDF)       N shards)
//! ```
//!
//! 1. [`input`]: check the source exists, is readable, and is a PDF
//! 2. [`render`]: rasterise selected pages to `temp_page_{n}.jpg`
//! 3. [`encode`]: JPEG encoding shared by render and assemble
//! 4. [`assemble`]: one page per image, combined into the intermediate PDF
//! 5. [`split`]: greedy size-threshold split into `{prefix}_{n}.pdf`
//!
//! [`compose`] holds the page-copy machinery that assemble and split share.

pub mod assemble;
pub mod compose;
pub mod encode;
pub mod input;
pub mod render;
pub mod split;
