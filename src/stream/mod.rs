pub mod message;
pub mod pipeline;
pub mod reducer;
pub mod tag_parser;
