pub mod prompt_builder;
pub mod response_extractor;
pub mod response_parser;

pub use prompt_builder::{build_scoring_prompt, build_scoring_prompt_from_template};
pub use response_extractor::extract_text;
pub use response_parser::parse_scoring_response;
