mod schema;
mod start;

pub use schema::run_generate_schema;
pub use start::run_start;
