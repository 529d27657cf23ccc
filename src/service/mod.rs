pub mod exam;
pub mod pages;
pub mod report;
