//! The board entity graph.
//!
//! Board → Column → Card → {label assignments, checklists → items, attachments}, plus
//! board-scoped labels and free-standing card templates. Positions are only ever written
//! through [`crate::ordering`]; deletes of boards, columns and cards go through
//! [`cascade`].

pub mod attachment;
pub mod board;
pub mod card;
pub mod cascade;
pub mod checklist;
pub mod column;
pub mod dashboard;
pub mod label;
pub mod template;
