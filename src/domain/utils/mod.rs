pub mod id;
pub mod report_writer;
