pub mod csv_export;
pub mod generator;
pub mod llm_service;
pub mod metadata_parser;

pub use csv_export::CsvExporter;
pub use generator::Generator;
pub use llm_service::LlmService;
pub use metadata_parser::parse_metadata_response;
