pub mod grade_type;
pub mod grading;
pub mod submit;
