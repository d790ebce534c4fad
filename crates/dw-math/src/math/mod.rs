//! Core math modules.

pub mod descriptive;
pub mod normal;
pub mod special;
pub mod student_t;
