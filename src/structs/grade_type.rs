// 学生的学号
pub type StudentId = String;
// 访问码
pub type AccessCode = String;
// 已生成报告的ID
pub type ReportId = String;
