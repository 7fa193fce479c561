mod local_file;

pub use local_file::describe_file;
