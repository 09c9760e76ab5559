//! Reading and reporting on traces written by `counterscope-runtime`.

pub mod error;
pub mod report;
