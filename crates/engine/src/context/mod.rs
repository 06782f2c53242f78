//! Context composition for a single user turn.
//!
//! Pulls merged knowledge and document chunks into one token-bounded bundle.
//!
//! # Sections (in priority order)
//!
//! | Priority | Source | Trim Strategy |
//! |----------|--------|---------------|
//! | 1. Branch knowledge | This conversation's merges | Newest first, last one head-truncated |
//! | 2. Documents | Retrieved chunks | Best-ranked first, last one head-truncated |
//! | 3. Previous knowledge | Other conversations (opt-in) | Newest first, never truncated |

pub mod composer;
pub mod token;

pub use composer::{Candidate, ComposeRequest, ComposerSettings, ContextComposer, fit_to_budget};
pub use token::{estimate_tokens, truncate_to_tokens};
